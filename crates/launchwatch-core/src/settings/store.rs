//! JSON persistence for [`Settings`].

use super::fields::{json_to_text, FIELDS};
use super::{FieldIssue, Settings};
use crate::config::PathsConfig;
use crate::error::{LaunchError, Result};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of loading a settings file.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    /// Fields that fell back to their default.
    pub issues: Vec<FieldIssue>,
    /// The file did not exist; `settings` are all defaults.
    pub created: bool,
}

impl LoadedSettings {
    /// Every stored value was accepted.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Reads and writes the settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the per-user default location.
    pub fn at_default_location() -> Result<Self> {
        Ok(Self::new(PathsConfig::default_settings_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, substituting defaults for missing or invalid fields.
    ///
    /// Only an unreadable or unparseable file is an error.
    pub fn load(&self) -> Result<LoadedSettings> {
        if !self.path.exists() {
            info!("No settings at {}, using defaults", self.path.display());
            return Ok(LoadedSettings {
                settings: Settings::default(),
                issues: Vec::new(),
                created: true,
            });
        }

        let contents =
            fs::read_to_string(&self.path).map_err(|e| LaunchError::io_with_path(e, &self.path))?;
        let root: Value = serde_json::from_str(&contents).map_err(|e| LaunchError::Json {
            message: format!("Failed to parse {}: {}", self.path.display(), e),
            source: Some(e),
        })?;
        let Value::Object(map) = root else {
            return Err(LaunchError::Config {
                message: format!("{} is not a JSON object", self.path.display()),
            });
        };

        let (settings, issues) = Self::from_map(&map);
        debug!(
            "Loaded settings from {} ({} issue(s))",
            self.path.display(),
            issues.len()
        );
        Ok(LoadedSettings {
            settings,
            issues,
            created: false,
        })
    }

    fn from_map(map: &Map<String, Value>) -> (Settings, Vec<FieldIssue>) {
        let mut settings = Settings::default();
        let mut issues = Vec::new();

        for spec in FIELDS {
            let Some(raw) = map.get(spec.name).and_then(json_to_text) else {
                continue;
            };
            let outcome = raw.and_then(|text| {
                spec.apply(&mut settings, &text)
                    .map_err(|message| format!("{message} ('{text}')"))
            });
            if let Err(message) = outcome {
                warn!(
                    "Setting {} rejected: {}; using default '{}'",
                    spec.name, message, spec.default
                );
                spec.reset(&mut settings);
                issues.push(FieldIssue {
                    field: spec.name,
                    value: map.get(spec.name).map(Value::to_string).unwrap_or_default(),
                    message,
                });
            }
        }

        for key in map.keys() {
            if !FIELDS.iter().any(|spec| spec.name == key) {
                debug!("Ignoring unknown setting '{}'", key);
            }
        }

        (settings, issues)
    }

    /// Write every field, atomically replacing the file.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let map: Map<String, Value> = FIELDS
            .iter()
            .map(|spec| (spec.name.to_string(), spec.to_json(settings)))
            .collect();
        let serialized = serde_json::to_string_pretty(&Value::Object(map))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| LaunchError::io_with_path(e, parent))?;
            }
        }

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(format!(".{}{}", std::process::id(), PathsConfig::SETTINGS_TEMP_SUFFIX));
        let temp_path = PathBuf::from(temp_name);

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| LaunchError::io_with_path(e, &temp_path))?;
            file.write_all(serialized.as_bytes())
                .and_then(|()| file.sync_all())
                .map_err(|e| LaunchError::io_with_path(e, &temp_path))?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(LaunchError::io_with_path(e, &self.path));
        }

        info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessPriority;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("settings.json"));

        let loaded = store.load().unwrap();
        assert!(loaded.created);
        assert!(loaded.is_clean());
        assert_eq!(loaded.settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("nested").join("settings.json"));

        let mut settings = Settings::default();
        settings.set("game_path", "/games/game");
        settings.set("game_args", "-windowed -w 1280");
        settings.set("close_launcher", "true");
        settings.set("game_priority", "AboveNormal");
        settings.set("inner_timeout_secs", "20");

        store.save(&settings).unwrap();
        let loaded = store.load().unwrap();
        assert!(!loaded.created);
        assert!(loaded.is_clean());
        assert_eq!(loaded.settings, settings);

        let leftovers: Vec<_> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_invalid_fields_fall_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "game_path": "/games/game",
                "game_priority": "Ludicrous",
                "game_affinity": "cores please",
                "global_timeout_secs": "soon",
                "close_launcher": true,
                "inner_timeout_secs": 4,
                "skip_launcher": null,
                "something_else": 1
            }"#,
        )
        .unwrap();

        let loaded = SettingsStore::new(&path).load().unwrap();
        let settings = &loaded.settings;
        assert_eq!(settings.game_path, "/games/game");
        assert_eq!(settings.game_priority, ProcessPriority::Normal);
        assert!(settings.game_affinity.is_empty());
        assert_eq!(settings.global_timeout_secs, 300);
        assert!(settings.close_launcher);
        assert_eq!(settings.inner_timeout_secs, 4);
        assert!(!settings.skip_launcher);

        let mut rejected: Vec<_> = loaded.issues.iter().map(|i| i.field).collect();
        rejected.sort_unstable();
        assert_eq!(
            rejected,
            ["game_affinity", "game_priority", "global_timeout_secs"]
        );
    }

    #[test]
    fn test_non_object_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            SettingsStore::new(&path).load(),
            Err(LaunchError::Config { .. })
        ));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SettingsStore::new(&path).load(),
            Err(LaunchError::Json { .. })
        ));
    }
}
