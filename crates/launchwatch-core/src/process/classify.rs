//! Window classification by title and class text.
//!
//! The table below is a heuristic whitelist of launcher windows as they
//! actually appear on screen. Matching is exact. A window that carries text
//! but matches nothing is an ordinary (`Normal`) window; a window with no
//! text at all cannot be classified.

use serde::Serialize;
use std::fmt;

/// Category of a launcher or game window.
///
/// Reflects what the OS actually launched, not what the user configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Normal,
    BattlenetLauncher,
    EpicGamesLauncherURI,
    UplayLauncher,
    OriginLauncher,
    Unclassified,
    /// Known non-actionable window (login prompts, splash screens).
    Excluded,
}

/// How the game stage is started once the launcher kind is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// Relaunch through the stored URI.
    Uri,
    /// Invoke the launcher again with the game's argument string.
    LauncherMediated,
    /// Start the game executable with its own arguments.
    Direct,
}

impl ProcessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessKind::Normal => "normal",
            ProcessKind::BattlenetLauncher => "battlenet",
            ProcessKind::EpicGamesLauncherURI => "epic",
            ProcessKind::UplayLauncher => "uplay",
            ProcessKind::OriginLauncher => "origin",
            ProcessKind::Unclassified => "unclassified",
            ProcessKind::Excluded => "excluded",
        }
    }

    pub fn launch_strategy(&self) -> LaunchStrategy {
        match self {
            ProcessKind::EpicGamesLauncherURI => LaunchStrategy::Uri,
            ProcessKind::BattlenetLauncher => LaunchStrategy::LauncherMediated,
            _ => LaunchStrategy::Direct,
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level window presented by a process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowInfo {
    /// Native window handle; 0 means none.
    pub handle: u64,
    pub title: String,
    pub class: String,
}

impl WindowInfo {
    pub fn new(handle: u64, title: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            handle,
            title: title.into(),
            class: class.into(),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.title.is_empty() || !self.class.is_empty()
    }
}

/// Maps a window to a [`ProcessKind`].
pub trait WindowClassifier: Send + Sync {
    fn classify(&self, window: &WindowInfo) -> ProcessKind;
}

/// `(title, class) -> kind` pairs known to identify launcher windows.
const KNOWN_WINDOWS: &[(&str, &str, ProcessKind)] = &[
    ("Blizzard Battle.net", "Qt5QWindowOwnDCIcon", ProcessKind::BattlenetLauncher),
    ("Battle.net", "Chrome_WidgetWin_0", ProcessKind::BattlenetLauncher),
    ("Battle.net Login", "Qt5QWindowIcon", ProcessKind::Excluded),
    ("Blizzard Battle.net Login", "Qt5QWindowIcon", ProcessKind::Excluded),
    ("Epic Games Launcher", "UnrealWindow", ProcessKind::EpicGamesLauncherURI),
    ("Epic Games Launcher", "Chrome_WidgetWin_1", ProcessKind::EpicGamesLauncherURI),
    ("Uplay", "uplay_main", ProcessKind::UplayLauncher),
    ("Ubisoft Connect", "uplay_main", ProcessKind::UplayLauncher),
    ("Uplay", "uplay_start", ProcessKind::Excluded),
    ("Origin", "Qt5QWindowIcon", ProcessKind::OriginLauncher),
    ("Origin", "Qt5QWindowOwnDCIcon", ProcessKind::OriginLauncher),
];

/// Static lookup-table classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowTable;

impl WindowClassifier for WindowTable {
    fn classify(&self, window: &WindowInfo) -> ProcessKind {
        if !window.has_text() {
            return ProcessKind::Unclassified;
        }

        KNOWN_WINDOWS
            .iter()
            .find(|(title, class, _)| *title == window.title && *class == window.class)
            .map(|(_, _, kind)| *kind)
            .unwrap_or(ProcessKind::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_launchers() {
        let table = WindowTable;
        assert_eq!(
            table.classify(&WindowInfo::new(1, "Epic Games Launcher", "UnrealWindow")),
            ProcessKind::EpicGamesLauncherURI
        );
        assert_eq!(
            table.classify(&WindowInfo::new(1, "Blizzard Battle.net", "Qt5QWindowOwnDCIcon")),
            ProcessKind::BattlenetLauncher
        );
        assert_eq!(
            table.classify(&WindowInfo::new(1, "Origin", "Qt5QWindowIcon")),
            ProcessKind::OriginLauncher
        );
    }

    #[test]
    fn test_login_prompt_is_excluded() {
        assert_eq!(
            WindowTable.classify(&WindowInfo::new(9, "Battle.net Login", "Qt5QWindowIcon")),
            ProcessKind::Excluded
        );
    }

    #[test]
    fn test_matching_is_exact() {
        assert_eq!(
            WindowTable.classify(&WindowInfo::new(1, "origin", "Qt5QWindowIcon")),
            ProcessKind::Normal
        );
        assert_eq!(
            WindowTable.classify(&WindowInfo::new(1, "Origin", "")),
            ProcessKind::Normal
        );
    }

    #[test]
    fn test_no_text_is_unclassified() {
        assert_eq!(WindowTable.classify(&WindowInfo::default()), ProcessKind::Unclassified);
    }

    #[test]
    fn test_launch_strategy() {
        assert_eq!(ProcessKind::EpicGamesLauncherURI.launch_strategy(), LaunchStrategy::Uri);
        assert_eq!(
            ProcessKind::BattlenetLauncher.launch_strategy(),
            LaunchStrategy::LauncherMediated
        );
        assert_eq!(ProcessKind::OriginLauncher.launch_strategy(), LaunchStrategy::Direct);
        assert_eq!(ProcessKind::Unclassified.launch_strategy(), LaunchStrategy::Direct);
    }
}
