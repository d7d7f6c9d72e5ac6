//! Platform-specific process primitives.
//!
//! Liveness checks, process-tree termination and URI opening. Everything
//! that needs a `#[cfg]` for processes lives here.

#![cfg_attr(windows, allow(unsafe_code))]

use crate::error::{LaunchError, Result};
use std::process::Command;
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)`; `EPERM` still means the process exists
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        // SAFETY: OpenProcess has no preconditions; a non-null handle is closed
        // exactly once before returning.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                false
            } else {
                CloseHandle(handle);
                true
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

/// Terminate a single process tree rooted at `pid`.
///
/// # Platform Behavior
/// - **Linux/macOS**: SIGTERM, wait up to `timeout_ms`, then SIGKILL. Children
///   are the caller's job (see `SystemProcessDirectory::kill`).
/// - **Windows**: `taskkill /PID {pid} /F /T`, which takes the tree with it
///
/// Returns `true` if the process is gone (or was never running).
pub fn terminate_process_tree(pid: u32, timeout_ms: u64) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_unix(pid, timeout_ms)
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        terminate_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout_ms;
        Err(LaunchError::unsupported("process termination"))
    }
}

#[cfg(unix)]
fn terminate_unix(pid: u32, timeout_ms: u64) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;
    use std::thread::sleep;
    use std::time::Duration;

    let raw = i32::try_from(pid).map_err(|_| LaunchError::Other(format!("Invalid pid {pid}")))?;
    let nix_pid = Pid::from_raw(raw);

    debug!("Sending SIGTERM to process {}", pid);
    match kill(nix_pid, Signal::SIGTERM) {
        Err(Errno::ESRCH) => return Ok(true),
        Err(Errno::EPERM) => {
            return Err(LaunchError::AccessDenied {
                pid,
                message: "SIGTERM not permitted".to_string(),
            })
        }
        Err(e) => warn!("Failed to send SIGTERM to {}: {}", pid, e),
        Ok(()) => {}
    }

    let wait_interval = Duration::from_millis(100);
    for _ in 0..(timeout_ms / 100).max(1) {
        sleep(wait_interval);
        // Reap if it was our child; ECHILD otherwise, which is fine.
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    match kill(nix_pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            return Err(LaunchError::Other(format!(
                "Failed to kill process {}: {}",
                pid, e
            )))
        }
    }

    sleep(wait_interval);
    let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));

    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn terminate_windows(pid: u32) -> Result<bool> {
    debug!("Terminating process tree {} with taskkill", pid);

    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F", "/T"])
        .output()
        .map_err(|e| LaunchError::Other(format!("Failed to run taskkill: {}", e)))?;

    if output.status.success() {
        return Ok(true);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("not found") || stderr.contains("not running") {
        Ok(true)
    } else if stderr.contains("Access is denied") {
        Err(LaunchError::AccessDenied {
            pid,
            message: stderr.trim().to_string(),
        })
    } else {
        warn!("taskkill failed for {}: {}", pid, stderr);
        Ok(false)
    }
}

/// Hand a URI to the desktop's default handler.
///
/// # Platform Behavior
/// - **Linux**: `xdg-open`
/// - **macOS**: `open`
/// - **Windows**: `cmd /C start "" <uri>`
pub fn open_uri(uri: &str) -> Result<()> {
    let mut cmd = opener_command(uri);
    let status = cmd.status().map_err(|e| LaunchError::LaunchFailed {
        target: uri.to_string(),
        message: format!("Failed to run URI opener: {}", e),
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(LaunchError::LaunchFailed {
            target: uri.to_string(),
            message: format!("URI opener exited with {}", status),
        })
    }
}

fn opener_command(uri: &str) -> Command {
    #[cfg(target_os = "windows")]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(uri);
        cmd
    }

    #[cfg(target_os = "macos")]
    {
        let mut cmd = Command::new("open");
        cmd.arg(uri);
        cmd
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(uri);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
    }

    #[test]
    fn test_terminate_nonexistent() {
        let result = terminate_process_tree(4_000_000_000, 100);
        assert!(matches!(result, Ok(true)));
    }
}
