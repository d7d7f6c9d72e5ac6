//! Platform abstraction layer for cross-platform compatibility.
//!
//! This module centralizes all platform-specific code. All `#[cfg]` blocks
//! for OS-specific behavior should live here rather than scattered through
//! the supervision logic.
//!
//! # Architecture
//!
//! - `args` - splitting argument strings
//! - `process` - liveness, process-tree termination, URI opening
//! - `tuning` - CPU affinity and scheduling priority
//! - `window` - main-window lookup and minimize (Windows only)
//!
//! # Supported Platforms
//!
//! - **Windows**: Full support
//! - **Linux**: Full support except window lookup (synthesized from process names)
//! - **macOS**: No CPU affinity; otherwise as Linux

pub mod args;
pub mod process;
pub mod tuning;
pub mod window;

pub use args::split_command_line;
pub use process::{is_process_alive, open_uri, terminate_process_tree};
pub use tuning::{set_affinity, set_priority};
pub use window::{main_window, minimize_window};

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}
