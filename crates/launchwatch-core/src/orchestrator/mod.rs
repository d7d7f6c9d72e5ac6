//! Sequencing a supervised run.
//!
//! A run walks five stages strictly in order:
//!
//! 1. pre-launch hook, awaited to exit
//! 2. launcher, started (or found) and watched until acquired
//! 3. game, started according to the launcher's kind and watched until it
//!    is gone for good
//! 4. post-game: minimize launcher, post hook, cooldown, close launcher
//! 5. cleanup
//!
//! The orchestrator is the only owner of monitors; everything it touches in
//! the OS goes through [`Collaborators`].

mod pipeline;
mod plan;

pub use pipeline::LaunchOrchestrator;
pub use plan::{GameStage, HookStage, LaunchPlan, LauncherStage, RunOptions, RunTiming};

use crate::process::{
    ProcessDirectory, ProcessKind, ProcessSpawner, SystemProcessDirectory, SystemSpawner,
    SystemWindows, WindowClassifier, WindowInspector, WindowTable,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// User-facing surface of a run: notifications and the tray icon.
pub trait Presenter: Send + Sync {
    /// Show a message the user must see, e.g. before a fatal abort.
    fn notify(&self, title: &str, message: &str);

    /// Release tray and window resources at the end of a run.
    fn release(&self);
}

/// [`Presenter`] that writes to the log. Used by the command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn notify(&self, title: &str, message: &str) {
        error!(category = "notify", "{}: {}", title, message);
    }

    fn release(&self) {
        info!(category = "notify", "Run finished");
    }
}

/// Everything outside the core a run depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn ProcessDirectory>,
    pub windows: Arc<dyn WindowInspector>,
    pub classifier: Arc<dyn WindowClassifier>,
    pub spawner: Arc<dyn ProcessSpawner>,
    pub presenter: Arc<dyn Presenter>,
}

impl Collaborators {
    /// The real OS, with the given presenter.
    pub fn system(presenter: Arc<dyn Presenter>) -> Self {
        Self {
            directory: Arc::new(SystemProcessDirectory::new()),
            windows: Arc::new(SystemWindows::new()),
            classifier: Arc::new(WindowTable),
            spawner: Arc::new(SystemSpawner::new()),
            presenter,
        }
    }
}

/// How the launcher stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LauncherOutcome {
    /// Disabled, not configured, or not launchable.
    #[default]
    Skipped,
    /// Could not be started.
    StartFailed,
    /// Never acquired before the global timeout; the run ends there.
    HardExit,
    Acquired,
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RunReport {
    pub launcher: LauncherOutcome,
    /// Classification after the stabilization delay.
    pub launcher_kind: Option<ProcessKind>,
    pub launcher_pid: Option<u32>,
    pub game_started: bool,
    pub game_acquired: bool,
    /// Affinity/priority were applied (at most once per run).
    pub tuning_applied: bool,
    pub post_game_ran: bool,
    pub launcher_closed: bool,
    pub finished: bool,
}
