//! The settings field table.
//!
//! One row per field: its name in the settings file, its kind (which picks
//! the validator), its default in text form, and accessors generated by the
//! `field!` macro. Nothing inspects `Settings` at runtime beyond this table.

use super::Settings;
use crate::affinity::{decode_affinity_expression, CoreTopology};
use crate::process::ProcessPriority;
use serde_json::Value;

/// Value kind of a field; selects parsing and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Executable path or protocol URI. Free text.
    Path,
    /// Argument string.
    Text,
    Bool,
    /// Non-negative whole seconds.
    Seconds,
    /// Affinity expression (core list, preset, decimal or hex).
    Affinity,
    Priority,
}

/// One row of the field table.
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Text form of the default value.
    pub default: &'static str,
    apply: fn(&mut Settings, &str) -> Result<(), String>,
    read: fn(&Settings) -> String,
    json: fn(&Settings) -> Value,
}

impl FieldSpec {
    /// Parse `raw` and store it, or explain why it was rejected.
    pub fn apply(&self, settings: &mut Settings, raw: &str) -> Result<(), String> {
        (self.apply)(settings, raw)
    }

    pub fn reset(&self, settings: &mut Settings) {
        // Defaults always parse; see test_every_default_is_valid.
        let _ = (self.apply)(settings, self.default);
    }

    pub fn read(&self, settings: &Settings) -> String {
        (self.read)(settings)
    }

    /// Value as written to the settings file.
    pub fn to_json(&self, settings: &Settings) -> Value {
        (self.json)(settings)
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .finish()
    }
}

/// Conversion between a typed settings value and its text/JSON forms.
trait FieldValue: Sized {
    fn parse(kind: FieldKind, raw: &str) -> Result<Self, String>;
    fn to_text(&self) -> String;
    fn to_json(&self) -> Value;
}

impl FieldValue for String {
    fn parse(kind: FieldKind, raw: &str) -> Result<Self, String> {
        let value = raw.trim();
        match kind {
            FieldKind::Path if value.contains('\0') => Err("path contains a NUL byte".to_string()),
            FieldKind::Affinity if !value.is_empty() => {
                let (mask, ok) = decode_affinity_expression(value, CoreTopology::detect());
                if ok {
                    Ok(value.to_string())
                } else {
                    Err(format!("not an affinity expression (decoded {})", mask.to_hex()))
                }
            }
            // Arguments keep their spacing.
            FieldKind::Text => Ok(raw.to_string()),
            _ => Ok(value.to_string()),
        }
    }

    fn to_text(&self) -> String {
        self.clone()
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FieldValue for bool {
    fn parse(_kind: FieldKind, raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            other => Err(format!("'{}' is not a boolean", other)),
        }
    }

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FieldValue for u64 {
    fn parse(_kind: FieldKind, raw: &str) -> Result<Self, String> {
        raw.trim()
            .parse::<u64>()
            .map_err(|e| format!("expected whole seconds: {}", e))
    }

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }
}

impl FieldValue for ProcessPriority {
    fn parse(_kind: FieldKind, raw: &str) -> Result<Self, String> {
        raw.parse().map_err(|e: crate::error::LaunchError| e.to_string())
    }

    fn to_text(&self) -> String {
        self.as_str().to_string()
    }

    fn to_json(&self) -> Value {
        Value::String(self.as_str().to_string())
    }
}

macro_rules! field {
    ($name:ident: $kind:ident = $default:expr) => {{
        fn apply(settings: &mut Settings, raw: &str) -> Result<(), String> {
            settings.$name = FieldValue::parse(FieldKind::$kind, raw)?;
            Ok(())
        }
        fn read(settings: &Settings) -> String {
            settings.$name.to_text()
        }
        fn json(settings: &Settings) -> Value {
            FieldValue::to_json(&settings.$name)
        }
        FieldSpec {
            name: stringify!($name),
            kind: FieldKind::$kind,
            default: $default,
            apply,
            read,
            json,
        }
    }};
}

/// Every persisted field, in file order.
pub static FIELDS: &[FieldSpec] = &[
    field!(pre_launch_path: Path = ""),
    field!(pre_launch_args: Text = ""),
    field!(pre_launch_delay_secs: Seconds = "0"),
    field!(launcher_path: Path = ""),
    field!(launcher_args: Text = ""),
    field!(launcher_uri: Path = ""),
    field!(game_path: Path = ""),
    field!(game_args: Text = ""),
    field!(game_uri: Path = ""),
    field!(monitor_path: Path = ""),
    field!(game_delay_secs: Seconds = "0"),
    field!(post_game_path: Path = ""),
    field!(post_game_args: Text = ""),
    field!(post_game_delay_secs: Seconds = "0"),
    field!(skip_launcher: Bool = "false"),
    field!(auto_game_launch: Bool = "false"),
    field!(relaunch_launcher: Bool = "false"),
    field!(close_launcher: Bool = "false"),
    field!(minimize_launcher: Bool = "false"),
    field!(elevate_externals: Bool = "false"),
    field!(game_affinity: Affinity = ""),
    field!(game_priority: Priority = "Normal"),
    field!(launcher_stabilization_secs: Seconds = "10"),
    field!(post_game_cooldown_secs: Seconds = "5"),
    field!(global_timeout_secs: Seconds = "300"),
    field!(inner_timeout_secs: Seconds = "10"),
];

pub(super) fn lookup(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.name == name)
}

/// Text form of a raw JSON value, or `None` for null.
pub(super) fn json_to_text(value: &Value) -> Option<Result<String, String>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Ok(s.clone())),
        Value::Bool(b) => Some(Ok(b.to_string())),
        Value::Number(n) => Some(Ok(n.to_string())),
        Value::Array(_) | Value::Object(_) => Some(Err("expected a scalar value".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_default_is_valid() {
        let mut settings = Settings::default();
        for spec in FIELDS {
            assert_eq!(spec.apply(&mut settings, spec.default), Ok(()), "{}", spec.name);
            assert_eq!(spec.read(&settings), spec.default, "{}", spec.name);
        }
    }

    #[test]
    fn test_field_names_are_unique() {
        let names: HashSet<_> = FIELDS.iter().map(|spec| spec.name).collect();
        assert_eq!(names.len(), FIELDS.len());
    }

    #[test]
    fn test_json_forms() {
        let settings = Settings::default();
        let json = |name| lookup(name).unwrap().to_json(&settings);
        assert_eq!(json("skip_launcher"), Value::Bool(false));
        assert_eq!(json("global_timeout_secs"), Value::from(300u64));
        assert_eq!(json("game_priority"), Value::String("Normal".to_string()));
    }

    #[test]
    fn test_json_to_text() {
        assert_eq!(json_to_text(&Value::Null), None);
        assert_eq!(json_to_text(&Value::from(12)), Some(Ok("12".to_string())));
        assert_eq!(json_to_text(&Value::Bool(true)), Some(Ok("true".to_string())));
        assert!(matches!(json_to_text(&serde_json::json!([1])), Some(Err(_))));
    }

    #[test]
    fn test_text_keeps_spacing_paths_are_trimmed() {
        let mut settings = Settings::default();
        lookup("game_args").unwrap().apply(&mut settings, " -w  1 ").unwrap();
        lookup("game_path").unwrap().apply(&mut settings, "  /g/game ").unwrap();
        assert_eq!(settings.game_args, " -w  1 ");
        assert_eq!(settings.game_path, "/g/game");
    }
}
