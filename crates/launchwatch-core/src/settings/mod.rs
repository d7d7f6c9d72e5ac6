//! User settings for a supervised run.
//!
//! Settings are a flat set of named fields described by the static table in
//! [`fields`]. Loading, validation and saving all walk that table; an invalid
//! value is reported and replaced by the field's default rather than failing
//! the whole file.

mod fields;
mod store;

pub use fields::{FieldKind, FieldSpec, FIELDS};
pub use store::{LoadedSettings, SettingsStore};

use crate::process::ProcessPriority;
use std::time::Duration;
use tracing::warn;

/// Every configurable value, flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub pre_launch_path: String,
    pub pre_launch_args: String,
    pub pre_launch_delay_secs: u64,

    pub launcher_path: String,
    pub launcher_args: String,
    pub launcher_uri: String,

    pub game_path: String,
    pub game_args: String,
    pub game_uri: String,
    pub monitor_path: String,
    pub game_delay_secs: u64,

    pub post_game_path: String,
    pub post_game_args: String,
    pub post_game_delay_secs: u64,

    pub skip_launcher: bool,
    pub auto_game_launch: bool,
    pub relaunch_launcher: bool,
    pub close_launcher: bool,
    pub minimize_launcher: bool,
    pub elevate_externals: bool,

    /// Affinity expression as written by the user; resolved at plan time.
    pub game_affinity: String,
    pub game_priority: ProcessPriority,

    pub launcher_stabilization_secs: u64,
    pub post_game_cooldown_secs: u64,
    pub global_timeout_secs: u64,
    pub inner_timeout_secs: u64,
}

/// A field whose stored value was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl Default for Settings {
    fn default() -> Self {
        let mut settings = Self::blank();
        for spec in FIELDS {
            spec.reset(&mut settings);
        }
        settings
    }
}

impl Settings {
    /// All fields zero/empty, before table defaults are applied.
    fn blank() -> Self {
        Self {
            pre_launch_path: String::new(),
            pre_launch_args: String::new(),
            pre_launch_delay_secs: 0,
            launcher_path: String::new(),
            launcher_args: String::new(),
            launcher_uri: String::new(),
            game_path: String::new(),
            game_args: String::new(),
            game_uri: String::new(),
            monitor_path: String::new(),
            game_delay_secs: 0,
            post_game_path: String::new(),
            post_game_args: String::new(),
            post_game_delay_secs: 0,
            skip_launcher: false,
            auto_game_launch: false,
            relaunch_launcher: false,
            close_launcher: false,
            minimize_launcher: false,
            elevate_externals: false,
            game_affinity: String::new(),
            game_priority: ProcessPriority::Normal,
            launcher_stabilization_secs: 0,
            post_game_cooldown_secs: 0,
            global_timeout_secs: 0,
            inner_timeout_secs: 0,
        }
    }

    /// Set a field by name from its text form.
    ///
    /// Returns `false` when the field is unknown or the value invalid; an
    /// invalid value leaves the field at its default.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        let Some(spec) = fields::lookup(name) else {
            warn!("Unknown setting '{}'", name);
            return false;
        };
        match spec.apply(self, value) {
            Ok(()) => true,
            Err(message) => {
                warn!(
                    "Invalid value '{}' for {}: {}; using default '{}'",
                    value, spec.name, message, spec.default
                );
                spec.reset(self);
                false
            }
        }
    }

    /// Text form of a field, or `None` for an unknown name.
    pub fn get(&self, name: &str) -> Option<String> {
        fields::lookup(name).map(|spec| spec.read(self))
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }

    pub fn inner_timeout(&self) -> Duration {
        Duration::from_secs(self.inner_timeout_secs)
    }

    pub fn launcher_stabilization(&self) -> Duration {
        Duration::from_secs(self.launcher_stabilization_secs)
    }

    pub fn post_game_cooldown(&self) -> Duration {
        Duration::from_secs(self.post_game_cooldown_secs)
    }
}
