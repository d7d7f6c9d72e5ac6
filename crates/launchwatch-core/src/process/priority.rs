//! Scheduling priority applied to the game once it is acquired.

use crate::error::LaunchError;
use std::fmt;
use std::str::FromStr;

/// Process priority class.
///
/// Mirrors the Windows priority classes; on Unix each maps to a nice value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessPriority {
    Idle,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    High,
    RealTime,
}

impl ProcessPriority {
    pub const ALL: [ProcessPriority; 6] = [
        ProcessPriority::Idle,
        ProcessPriority::BelowNormal,
        ProcessPriority::Normal,
        ProcessPriority::AboveNormal,
        ProcessPriority::High,
        ProcessPriority::RealTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessPriority::Idle => "Idle",
            ProcessPriority::BelowNormal => "BelowNormal",
            ProcessPriority::Normal => "Normal",
            ProcessPriority::AboveNormal => "AboveNormal",
            ProcessPriority::High => "High",
            ProcessPriority::RealTime => "RealTime",
        }
    }

    /// Equivalent Unix nice value.
    pub fn nice_value(&self) -> i32 {
        match self {
            ProcessPriority::Idle => 19,
            ProcessPriority::BelowNormal => 10,
            ProcessPriority::Normal => 0,
            ProcessPriority::AboveNormal => -5,
            ProcessPriority::High => -10,
            ProcessPriority::RealTime => -20,
        }
    }
}

impl fmt::Display for ProcessPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessPriority {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LaunchError::Validation {
                field: "priority".to_string(),
                message: format!("unknown priority '{}'", s),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("high".parse::<ProcessPriority>().unwrap(), ProcessPriority::High);
        assert_eq!(
            " AboveNormal ".parse::<ProcessPriority>().unwrap(),
            ProcessPriority::AboveNormal
        );
        assert!("turbo".parse::<ProcessPriority>().is_err());
    }

    #[test]
    fn test_default_is_normal() {
        assert_eq!(ProcessPriority::default(), ProcessPriority::Normal);
        assert_eq!(ProcessPriority::Normal.nice_value(), 0);
    }
}
