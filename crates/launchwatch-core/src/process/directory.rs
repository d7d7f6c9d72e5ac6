//! OS process directory and window inspection.
//!
//! The supervision core only talks to the OS through the two traits here,
//! so monitors and the orchestrator can run against fakes in tests. The
//! `System*` implementations are the real ones, built on `sysinfo` and the
//! platform layer.

use super::classify::WindowInfo;
use super::priority::ProcessPriority;
use crate::affinity::AffinityMask;
use crate::config::StageDefaults;
use crate::error::Result;
use crate::platform;
use std::collections::HashSet;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// A process found by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRef {
    pub pid: u32,
    pub name: String,
}

/// Process listing and control.
pub trait ProcessDirectory: Send + Sync {
    /// All live processes whose executable name matches `name`.
    fn find_by_name(&self, name: &str) -> Result<Vec<ProcessRef>>;

    fn is_alive(&self, pid: u32) -> bool;

    /// Terminate every process tree whose root matches `name`.
    ///
    /// Returns the number of matching roots that are gone afterwards.
    fn kill(&self, name: &str) -> Result<usize>;

    fn set_affinity(&self, pid: u32, mask: AffinityMask) -> Result<()>;

    fn set_priority(&self, pid: u32, priority: ProcessPriority) -> Result<()>;
}

/// Window lookup for a process.
pub trait WindowInspector: Send + Sync {
    fn main_window(&self, pid: u32) -> Result<Option<WindowInfo>>;

    fn minimize(&self, window: &WindowInfo) -> Result<()>;
}

/// Normalized executable stem used for name matching.
///
/// `C:\Games\Game.EXE`, `/opt/game/Game.exe` and `game` all become `game`.
pub fn process_stem(name_or_path: &str) -> String {
    let file = name_or_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name_or_path)
        .trim();
    let lower = file.to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

fn matches_stem(process: &sysinfo::Process, stem: &str) -> bool {
    if process_stem(&process.name().to_string_lossy()) == stem {
        return true;
    }
    // Linux truncates the process name to 15 bytes; the exe path is complete.
    process
        .exe()
        .and_then(|exe| exe.file_name())
        .is_some_and(|file| process_stem(&file.to_string_lossy()) == stem)
}

/// [`ProcessDirectory`] backed by the live process table.
pub struct SystemProcessDirectory {
    system: Mutex<System>,
    terminate_timeout_ms: u64,
}

impl SystemProcessDirectory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            terminate_timeout_ms: StageDefaults::TERMINATE_TIMEOUT_MS,
        }
    }

    fn refreshed(&self) -> std::sync::MutexGuard<'_, System> {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_exe(sysinfo::UpdateKind::OnlyIfNotSet),
        );
        system
    }

    /// All descendants of `roots`, deepest first.
    fn descendants(system: &System, roots: &[u32]) -> Vec<u32> {
        let mut seen: HashSet<u32> = roots.iter().copied().collect();
        let mut frontier: Vec<Pid> = roots.iter().map(|pid| Pid::from_u32(*pid)).collect();
        let mut ordered = Vec::new();

        while let Some(parent) = frontier.pop() {
            for (pid, process) in system.processes() {
                if process.parent() == Some(parent) && seen.insert(pid.as_u32()) {
                    ordered.push(pid.as_u32());
                    frontier.push(*pid);
                }
            }
        }

        ordered.reverse();
        ordered
    }
}

impl Default for SystemProcessDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessDirectory for SystemProcessDirectory {
    fn find_by_name(&self, name: &str) -> Result<Vec<ProcessRef>> {
        let stem = process_stem(name);
        let system = self.refreshed();

        let mut found: Vec<ProcessRef> = system
            .processes()
            .iter()
            .filter(|(_, process)| matches_stem(process, &stem))
            .map(|(pid, process)| ProcessRef {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
            })
            .collect();
        found.sort_by_key(|p| p.pid);

        debug!("find_by_name('{}'): {} match(es)", name, found.len());
        Ok(found)
    }

    fn is_alive(&self, pid: u32) -> bool {
        platform::is_process_alive(pid)
    }

    fn kill(&self, name: &str) -> Result<usize> {
        let stem = process_stem(name);
        let (roots, children) = {
            let system = self.refreshed();
            let roots: Vec<u32> = system
                .processes()
                .iter()
                .filter(|(_, process)| matches_stem(process, &stem))
                .map(|(pid, _)| pid.as_u32())
                .collect();
            let children = Self::descendants(&system, &roots);
            (roots, children)
        };

        for pid in children {
            if let Err(e) = platform::terminate_process_tree(pid, self.terminate_timeout_ms) {
                warn!("Failed to terminate child process {}: {}", pid, e);
            }
        }

        let mut stopped = 0;
        for pid in &roots {
            match platform::terminate_process_tree(*pid, self.terminate_timeout_ms) {
                Ok(true) => stopped += 1,
                Ok(false) => warn!("Process {} ('{}') survived termination", pid, name),
                Err(e) => warn!("Failed to terminate process {} ('{}'): {}", pid, name, e),
            }
        }

        info!("Terminated {}/{} process tree(s) named '{}'", stopped, roots.len(), name);
        Ok(stopped)
    }

    fn set_affinity(&self, pid: u32, mask: AffinityMask) -> Result<()> {
        platform::set_affinity(pid, mask)
    }

    fn set_priority(&self, pid: u32, priority: ProcessPriority) -> Result<()> {
        platform::set_priority(pid, priority)
    }
}

/// [`WindowInspector`] for the current desktop.
///
/// On platforms without a per-process main window, a process presents a
/// synthetic window titled with its process name and keyed by its PID, so a
/// live process is treated as having a window.
pub struct SystemWindows {
    system: Mutex<System>,
}

impl SystemWindows {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn synthetic_window(&self, pid: u32) -> Option<WindowInfo> {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sys_pid = Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new(),
        );
        system.process(sys_pid).map(|process| {
            WindowInfo::new(u64::from(pid), process.name().to_string_lossy(), "")
        })
    }
}

impl Default for SystemWindows {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowInspector for SystemWindows {
    fn main_window(&self, pid: u32) -> Result<Option<WindowInfo>> {
        if cfg!(windows) {
            platform::main_window(pid)
        } else {
            Ok(self.synthetic_window(pid))
        }
    }

    fn minimize(&self, window: &WindowInfo) -> Result<()> {
        platform::minimize_window(window.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_stem() {
        assert_eq!(process_stem(r"C:\Games\Game.EXE"), "game");
        assert_eq!(process_stem("/opt/game/Game.exe"), "game");
        assert_eq!(process_stem("Battle.net"), "battle.net");
        assert_eq!(process_stem("game"), "game");
    }

    #[test]
    fn test_find_self_by_name() {
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().into_owned();

        let directory = SystemProcessDirectory::new();
        let found = directory.find_by_name(&name).unwrap();
        assert!(found.iter().any(|p| p.pid == std::process::id()));
    }

    #[test]
    fn test_find_unknown_name_is_empty() {
        let directory = SystemProcessDirectory::new();
        let found = directory
            .find_by_name("launchwatch-no-such-process-7f3a")
            .unwrap();
        assert!(found.is_empty());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_synthetic_window_for_self() {
        let window = SystemWindows::new()
            .main_window(std::process::id())
            .unwrap()
            .unwrap();
        assert_eq!(window.handle, u64::from(std::process::id()));
        assert!(!window.title.is_empty());
    }
}
