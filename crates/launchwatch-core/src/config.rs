//! Centralized configuration constants for launchwatch.
//!
//! User-editable settings live in [`crate::settings`]; this module holds the
//! compile-time defaults they fall back to and the fixed timing parameters.

use crate::error::{LaunchError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Timing for process monitors.
pub struct MonitorDefaults;

impl MonitorDefaults {
    /// Fixed polling interval for every monitor tick.
    pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
    /// Initial acquisition horizon. Launchers may sit on update dialogs for a while.
    pub const GLOBAL_TIMEOUT: Duration = Duration::from_secs(300);
    /// Re-acquisition horizon after the target disappears.
    pub const INNER_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Timing and behavior for launch stages.
pub struct StageDefaults;

impl StageDefaults {
    /// Wait after the launcher is acquired before classifying its window.
    pub const LAUNCHER_STABILIZATION: Duration = Duration::from_secs(10);
    /// Wait after the post-game hook before closing the launcher.
    pub const POST_GAME_COOLDOWN: Duration = Duration::from_secs(5);
    /// Grace period between SIGTERM and SIGKILL when closing a process tree.
    pub const TERMINATE_TIMEOUT_MS: u64 = 2000;
}

/// Shared directory and path configuration.
pub struct PathsConfig;

impl PathsConfig {
    pub const CONFIG_DIR_NAME: &'static str = "launchwatch";
    pub const SETTINGS_FILE_NAME: &'static str = "settings.json";
    pub const SETTINGS_TEMP_SUFFIX: &'static str = ".tmp";

    /// Default settings file location under the user's config directory.
    pub fn default_settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| LaunchError::Config {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir
            .join(Self::CONFIG_DIR_NAME)
            .join(Self::SETTINGS_FILE_NAME))
    }
}
