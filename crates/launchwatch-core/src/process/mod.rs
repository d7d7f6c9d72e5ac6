//! Process supervision.
//!
//! Everything the orchestrator knows about external processes goes through
//! this module:
//!
//! - [`ProcessDirectory`] / [`WindowInspector`]: OS listing, control and
//!   window lookup, with `System*` implementations
//! - [`WindowClassifier`]: maps a top-level window to a [`ProcessKind`]
//! - [`ProcessHandle`]: one name resolved to a live process
//! - [`ProcessMonitor`]: the acquisition state machine
//! - [`ProcessSpawner`]: starting stage processes
//!
//! # Example
//!
//! ```rust,no_run
//! use launchwatch_core::process::{
//!     MonitorConfig, ProcessDescriptor, ProcessHandle, ProcessMonitor, SystemProcessDirectory,
//!     SystemWindows, WindowTable,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let descriptor = ProcessDescriptor::new("Game.exe");
//!     let handle = ProcessHandle::new(
//!         "Game.exe",
//!         Arc::new(SystemProcessDirectory::new()),
//!         Arc::new(SystemWindows::new()),
//!         Arc::new(WindowTable),
//!     );
//!     let monitor = ProcessMonitor::spawn(&descriptor, handle, MonitorConfig::default(), tx);
//!
//!     while let Some(event) = rx.recv().await {
//!         println!("{event:?}");
//!     }
//!     monitor.stop().await;
//! }
//! ```

mod classify;
mod directory;
mod handle;
mod launcher;
mod monitor;
mod priority;

#[cfg(test)]
mod test_support;

pub use classify::{LaunchStrategy, ProcessKind, WindowClassifier, WindowInfo, WindowTable};
pub use directory::{
    process_stem, ProcessDirectory, ProcessRef, SystemProcessDirectory, SystemWindows,
    WindowInspector,
};
pub use handle::{ProcessDescriptor, ProcessHandle, ProcessSnapshot};
pub use launcher::{ProcessSpawner, StageCommand, StageTarget, SystemSpawner};
pub use monitor::{MonitorConfig, MonitorEvent, MonitorPhase, ProcessMonitor};
pub use priority::ProcessPriority;
