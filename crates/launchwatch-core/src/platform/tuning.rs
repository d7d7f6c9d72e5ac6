//! CPU affinity and scheduling priority for a running process.

#![allow(unsafe_code)]

use crate::affinity::AffinityMask;
use crate::error::{LaunchError, Result};
use crate::process::ProcessPriority;
use tracing::debug;

/// Restrict a process to the cores in `mask`.
///
/// # Platform Behavior
/// - **Linux**: `sched_setaffinity` on every thread listed in `/proc/{pid}/task`
/// - **Windows**: `SetProcessAffinityMask`
/// - **macOS**: unsupported (no hard affinity API)
pub fn set_affinity(pid: u32, mask: AffinityMask) -> Result<()> {
    if mask.is_disabled() {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        set_affinity_linux(pid, mask)
    }

    #[cfg(windows)]
    {
        set_affinity_windows(pid, mask)
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        let _ = pid;
        Err(LaunchError::unsupported("CPU affinity"))
    }
}

#[cfg(target_os = "linux")]
fn set_affinity_linux(pid: u32, mask: AffinityMask) -> Result<()> {
    use nix::errno::Errno;
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut set = CpuSet::new();
    for core in mask.cores() {
        set.set(core as usize)
            .map_err(|e| LaunchError::Other(format!("Core {} not settable: {}", core, e)))?;
    }

    // Affinity is per thread on Linux; the main thread alone is not enough.
    let mut tids: Vec<i32> = std::fs::read_dir(format!("/proc/{pid}/task"))
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
                .collect()
        })
        .unwrap_or_default();
    if tids.is_empty() {
        tids.push(i32::try_from(pid).map_err(|_| LaunchError::Other(format!("Invalid pid {pid}")))?);
    }

    for tid in tids {
        match sched_setaffinity(Pid::from_raw(tid), &set) {
            Ok(()) => {}
            Err(Errno::EPERM) => {
                return Err(LaunchError::AccessDenied {
                    pid,
                    message: "sched_setaffinity not permitted".to_string(),
                })
            }
            // Thread exited between listing and setting.
            Err(Errno::ESRCH) => {}
            Err(e) => return Err(LaunchError::Other(format!("sched_setaffinity: {}", e))),
        }
    }

    debug!("Applied affinity {} to process {}", mask.to_hex(), pid);
    Ok(())
}

#[cfg(windows)]
fn set_affinity_windows(pid: u32, mask: AffinityMask) -> Result<()> {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{
        OpenProcess, SetProcessAffinityMask, PROCESS_QUERY_INFORMATION, PROCESS_SET_INFORMATION,
    };

    // SAFETY: the handle is checked for null and closed exactly once.
    let ok = unsafe {
        let handle = OpenProcess(PROCESS_SET_INFORMATION | PROCESS_QUERY_INFORMATION, 0, pid);
        if handle.is_null() {
            return Err(LaunchError::AccessDenied {
                pid,
                message: std::io::Error::last_os_error().to_string(),
            });
        }
        let ok = SetProcessAffinityMask(handle, mask.bits() as usize);
        CloseHandle(handle);
        ok
    };

    if ok == 0 {
        return Err(LaunchError::Other(format!(
            "SetProcessAffinityMask failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    debug!("Applied affinity {} to process {}", mask.to_hex(), pid);
    Ok(())
}

/// Change the scheduling priority of a process.
///
/// # Platform Behavior
/// - **Linux/macOS**: `setpriority(PRIO_PROCESS)` with the priority's nice value
/// - **Windows**: `SetPriorityClass`
pub fn set_priority(pid: u32, priority: ProcessPriority) -> Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: setpriority only reads its integer arguments.
        let rc = unsafe {
            libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, priority.nice_value())
        };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            return Err(match err.kind() {
                std::io::ErrorKind::PermissionDenied => LaunchError::AccessDenied {
                    pid,
                    message: err.to_string(),
                },
                _ => LaunchError::Other(format!("setpriority: {}", err)),
            });
        }
        debug!("Applied priority {} to process {}", priority, pid);
        Ok(())
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            OpenProcess, SetPriorityClass, ABOVE_NORMAL_PRIORITY_CLASS,
            BELOW_NORMAL_PRIORITY_CLASS, HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS,
            NORMAL_PRIORITY_CLASS, PROCESS_SET_INFORMATION, REALTIME_PRIORITY_CLASS,
        };

        let class = match priority {
            ProcessPriority::Idle => IDLE_PRIORITY_CLASS,
            ProcessPriority::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            ProcessPriority::Normal => NORMAL_PRIORITY_CLASS,
            ProcessPriority::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
            ProcessPriority::High => HIGH_PRIORITY_CLASS,
            ProcessPriority::RealTime => REALTIME_PRIORITY_CLASS,
        };

        // SAFETY: the handle is checked for null and closed exactly once.
        let ok = unsafe {
            let handle = OpenProcess(PROCESS_SET_INFORMATION, 0, pid);
            if handle.is_null() {
                return Err(LaunchError::AccessDenied {
                    pid,
                    message: std::io::Error::last_os_error().to_string(),
                });
            }
            let ok = SetPriorityClass(handle, class);
            CloseHandle(handle);
            ok
        };

        if ok == 0 {
            return Err(LaunchError::Other(format!(
                "SetPriorityClass failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        debug!("Applied priority {} to process {}", priority, pid);
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (pid, priority);
        Err(LaunchError::unsupported("process priority"))
    }
}
