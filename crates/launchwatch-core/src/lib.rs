//! launchwatch core - headless supervision of game launchers and games.
//!
//! A run starts an optional pre-launch hook, a launcher, and a game, watches
//! each process until it is acquired and until it is gone for good, applies
//! CPU affinity and priority to the game, then runs the post-game steps.
//! Nothing here needs a UI; user notifications go through a
//! [`orchestrator::Presenter`].
//!
//! # Example
//!
//! ```rust,no_run
//! use launchwatch_core::orchestrator::{Collaborators, LaunchOrchestrator, LaunchPlan, LogPresenter};
//! use launchwatch_core::settings::SettingsStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> launchwatch_core::Result<()> {
//!     let loaded = SettingsStore::at_default_location()?.load()?;
//!     let plan = LaunchPlan::from_settings(&loaded.settings);
//!
//!     let orchestrator =
//!         LaunchOrchestrator::new(plan, Collaborators::system(Arc::new(LogPresenter)));
//!     let report = orchestrator.run().await?;
//!     println!("game acquired: {}", report.game_acquired);
//!     Ok(())
//! }
//! ```

pub mod affinity;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod process;
pub mod settings;

// Re-export commonly used types
pub use affinity::{
    decode_affinity_expression, decode_core_list, encode_core_list, AffinityMask, CoreTopology,
};
pub use error::{LaunchError, Result};
pub use orchestrator::{
    Collaborators, LaunchOrchestrator, LaunchPlan, LauncherOutcome, Presenter, RunReport,
};
pub use process::{
    MonitorConfig, MonitorEvent, MonitorPhase, ProcessDescriptor, ProcessHandle, ProcessKind,
    ProcessMonitor, ProcessPriority,
};
pub use settings::{Settings, SettingsStore};
