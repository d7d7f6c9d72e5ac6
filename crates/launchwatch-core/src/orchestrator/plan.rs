//! Resolving settings into the stages of one run.

use crate::affinity::{decode_affinity_expression, AffinityMask, CoreTopology};
use crate::platform::split_command_line;
use crate::process::{
    process_stem, MonitorConfig, ProcessDescriptor, ProcessPriority, StageCommand, StageTarget,
};
use crate::settings::Settings;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// An external hook run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookStage {
    pub command: StageCommand,
    pub delay: Duration,
}

/// The launcher: what to start and which process to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherStage {
    /// Path when it exists on disk, else the configured URI.
    pub command: StageCommand,
    /// Executable path; used for process lookup, relaunch and close.
    pub executable: PathBuf,
}

impl LauncherStage {
    /// Name the launcher process is found by.
    pub fn process_name(&self) -> String {
        process_stem(&self.executable.to_string_lossy())
    }
}

/// The game: how it can be started and what to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStage {
    pub path: Option<PathBuf>,
    pub uri: Option<String>,
    pub args: Vec<String>,
    /// `None` when only a URI is configured and nothing names a process.
    pub monitor: Option<ProcessDescriptor>,
    pub delay: Duration,
}

/// Behavior switches for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub skip_launcher: bool,
    pub auto_game_launch: bool,
    pub relaunch_launcher: bool,
    pub close_launcher: bool,
    pub minimize_launcher: bool,
}

/// Waits between and around stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTiming {
    pub monitor: MonitorConfig,
    pub launcher_stabilization: Duration,
    pub post_game_cooldown: Duration,
}

/// Everything a run needs, resolved from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub pre_launch: Option<HookStage>,
    /// `None` when not configured or not launchable.
    pub launcher: Option<LauncherStage>,
    /// `None` when neither an existing game path nor a game URI is configured.
    pub game: Option<GameStage>,
    pub post_game: Option<HookStage>,
    pub options: RunOptions,
    pub timing: RunTiming,
    pub affinity: AffinityMask,
    pub priority: ProcessPriority,
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Split a configured argument string; unparseable input means no arguments.
fn split_args(field: &str, line: &str) -> Vec<String> {
    split_command_line(line).unwrap_or_else(|e| {
        warn!(category = "settings", "Ignoring {}: {}", field, e);
        Vec::new()
    })
}

impl LaunchPlan {
    /// Build a plan, detecting the CPU topology for affinity presets.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_topology(settings, CoreTopology::detect())
    }

    pub fn with_topology(settings: &Settings, topology: Option<CoreTopology>) -> Self {
        let plan = Self {
            pre_launch: Self::hook(
                &settings.pre_launch_path,
                split_args("pre_launch_args", &settings.pre_launch_args),
                settings.pre_launch_delay_secs,
                settings.elevate_externals,
            ),
            launcher: Self::launcher(settings),
            game: Self::game(settings),
            post_game: Self::hook(
                &settings.post_game_path,
                split_args("post_game_args", &settings.post_game_args),
                settings.post_game_delay_secs,
                settings.elevate_externals,
            ),
            options: RunOptions {
                skip_launcher: settings.skip_launcher,
                auto_game_launch: settings.auto_game_launch,
                relaunch_launcher: settings.relaunch_launcher,
                close_launcher: settings.close_launcher,
                minimize_launcher: settings.minimize_launcher,
            },
            timing: RunTiming {
                monitor: MonitorConfig::with_timeouts(
                    settings.global_timeout(),
                    settings.inner_timeout(),
                ),
                launcher_stabilization: settings.launcher_stabilization(),
                post_game_cooldown: settings.post_game_cooldown(),
            },
            affinity: Self::affinity(&settings.game_affinity, topology),
            priority: settings.game_priority,
        };
        debug!("Resolved launch plan: {:?}", plan);
        plan
    }

    fn hook(path: &str, args: Vec<String>, delay_secs: u64, elevated: bool) -> Option<HookStage> {
        let path = non_empty(path)?;
        Some(HookStage {
            command: StageCommand::new(StageTarget::Path(PathBuf::from(path)))
                .with_args(args)
                .elevated(elevated),
            delay: Duration::from_secs(delay_secs),
        })
    }

    fn launcher(settings: &Settings) -> Option<LauncherStage> {
        let executable = PathBuf::from(non_empty(&settings.launcher_path)?);

        let target = if executable.is_file() {
            StageTarget::Path(executable.clone())
        } else if let Some(uri) = non_empty(&settings.launcher_uri) {
            StageTarget::Uri(uri.to_string())
        } else {
            warn!(
                category = "launcher",
                "Launcher path {} does not exist and no launcher URI is set",
                executable.display()
            );
            return None;
        };

        Some(LauncherStage {
            command: StageCommand::new(target)
                .with_args(split_args("launcher_args", &settings.launcher_args)),
            executable,
        })
    }

    fn game(settings: &Settings) -> Option<GameStage> {
        let path = non_empty(&settings.game_path).and_then(|path| match StageTarget::parse(path) {
            Some(StageTarget::Path(path)) if !path.is_file() => {
                warn!(
                    category = "game",
                    "Game path {} does not exist; ignoring it",
                    path.display()
                );
                None
            }
            _ => Some(PathBuf::from(path)),
        });
        let uri = non_empty(&settings.game_uri).map(str::to_string);
        if path.is_none() && uri.is_none() {
            return None;
        }

        let monitor = match (non_empty(&settings.monitor_path), &path) {
            (Some(monitor), Some(path)) => Some(
                ProcessDescriptor::new(path.to_string_lossy()).with_monitor_name(monitor),
            ),
            (Some(monitor), None) => Some(ProcessDescriptor::new(monitor)),
            (None, Some(path)) => Some(ProcessDescriptor::new(path.to_string_lossy())),
            (None, None) => None,
        };

        Some(GameStage {
            path,
            uri,
            args: split_args("game_args", &settings.game_args),
            monitor,
            delay: Duration::from_secs(settings.game_delay_secs),
        })
    }

    fn affinity(expression: &str, topology: Option<CoreTopology>) -> AffinityMask {
        let Some(expression) = non_empty(expression) else {
            return AffinityMask::DISABLED;
        };
        match decode_affinity_expression(expression, topology) {
            (mask, true) => mask,
            (_, false) => {
                warn!(
                    category = "affinity",
                    "Could not decode affinity '{}'; affinity disabled", expression
                );
                AffinityMask::DISABLED
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Settings with an existing `Game.exe` inside `dir` as the game path.
    fn settings(dir: &TempDir) -> Settings {
        let game = dir.path().join("Game.exe");
        std::fs::write(&game, b"").unwrap();
        let mut settings = Settings::default();
        settings.set("game_path", &game.to_string_lossy());
        settings
    }

    #[test]
    fn test_empty_stages_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let game_path = temp_dir.path().join("Game.exe");
        let plan = LaunchPlan::with_topology(&settings(&temp_dir), None);
        assert!(plan.pre_launch.is_none());
        assert!(plan.launcher.is_none());
        assert!(plan.post_game.is_none());
        assert_eq!(plan.affinity, AffinityMask::DISABLED);

        let game = plan.game.unwrap();
        assert_eq!(game.path.as_ref(), Some(&game_path));
        assert_eq!(
            game.monitor.unwrap().search_name(),
            game_path.to_string_lossy()
        );
    }

    #[test]
    fn test_missing_game() {
        let plan = LaunchPlan::with_topology(&Settings::default(), None);
        assert!(plan.game.is_none());
    }

    #[test]
    fn test_nonexistent_game_path_is_dropped() {
        let mut settings = Settings::default();
        settings.set("game_path", "/nowhere/at/all/Game.exe");
        assert!(LaunchPlan::with_topology(&settings, None).game.is_none());

        settings.set("game_uri", "steam://rungameid/570");
        let game = LaunchPlan::with_topology(&settings, None).game.unwrap();
        assert!(game.path.is_none());
        assert_eq!(game.uri.as_deref(), Some("steam://rungameid/570"));
    }

    #[test]
    fn test_game_args_are_split() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = settings(&temp_dir);
        settings.set("game_args", r#"-windowed --profile "Player One""#);
        let game = LaunchPlan::with_topology(&settings, None).game.unwrap();
        assert_eq!(game.args, vec!["-windowed", "--profile", "Player One"]);
    }

    #[test]
    fn test_monitor_path_redirects_game_monitor() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = settings(&temp_dir);
        settings.set("monitor_path", "/games/RealGame.exe");
        let game = LaunchPlan::with_topology(&settings, None).game.unwrap();
        assert_eq!(game.monitor.unwrap().search_name(), "/games/RealGame.exe");
    }

    #[test]
    fn test_uri_only_game_has_no_monitor() {
        let mut settings = Settings::default();
        settings.set("game_uri", "com.epicgames.launcher://apps/Fortnite?action=launch");
        let game = LaunchPlan::with_topology(&settings, None).game.unwrap();
        assert!(game.path.is_none());
        assert!(game.monitor.is_none());
    }

    #[test]
    fn test_launcher_path_wins_when_it_exists() {
        let temp_dir = TempDir::new().unwrap();
        let exe = temp_dir.path().join("Launcher.exe");
        std::fs::write(&exe, b"").unwrap();

        let mut settings = settings(&temp_dir);
        settings.set("launcher_path", &exe.to_string_lossy());
        settings.set("launcher_uri", "launcher://start");
        settings.set("launcher_args", "--silent");

        let launcher = LaunchPlan::with_topology(&settings, None).launcher.unwrap();
        assert_eq!(launcher.command.target, StageTarget::Path(exe));
        assert_eq!(launcher.command.args, vec!["--silent"]);
        assert_eq!(launcher.process_name(), "launcher");
    }

    #[test]
    fn test_launcher_uri_used_when_path_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = settings(&temp_dir);
        settings.set("launcher_path", "/nowhere/Launcher.exe");
        settings.set("launcher_uri", "launcher://start");
        let launcher = LaunchPlan::with_topology(&settings, None).launcher.unwrap();
        assert!(launcher.command.target.is_uri());

        settings.set("launcher_uri", "");
        assert!(LaunchPlan::with_topology(&settings, None).launcher.is_none());
    }

    #[test]
    fn test_affinity_and_hooks() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = settings(&temp_dir);
        settings.set("game_affinity", "QuadCore");
        settings.set("post_game_path", "/hooks/after.sh");
        settings.set("post_game_delay_secs", "3");
        settings.set("elevate_externals", "true");

        let plan = LaunchPlan::with_topology(&settings, Some(CoreTopology::new(4, 8)));
        assert_eq!(plan.affinity, AffinityMask::QUAD_CORE_HT);
        let post = plan.post_game.unwrap();
        assert!(post.command.elevated);
        assert_eq!(post.delay, Duration::from_secs(3));
    }

    #[test]
    fn test_topology_dependent_affinity_without_topology_is_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = settings(&temp_dir);
        settings.game_affinity = "DisableHT".to_string();
        let plan = LaunchPlan::with_topology(&settings, None);
        assert_eq!(plan.affinity, AffinityMask::DISABLED);
    }
}
