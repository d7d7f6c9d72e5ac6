//! In-memory process table for unit tests.

use super::classify::WindowInfo;
use super::directory::{process_stem, ProcessDirectory, ProcessRef, WindowInspector};
use super::priority::ProcessPriority;
use crate::affinity::AffinityMask;
use crate::error::{LaunchError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct FakeProcess {
    pid: u32,
    name: String,
    window: Option<WindowInfo>,
}

#[derive(Default)]
pub(crate) struct FakeProcesses {
    processes: Mutex<Vec<FakeProcess>>,
    failing: Mutex<bool>,
    pub(crate) affinity: Mutex<HashMap<u32, AffinityMask>>,
    pub(crate) priority: Mutex<HashMap<u32, ProcessPriority>>,
}

impl FakeProcesses {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn start(&self, name: &str, pid: u32, window: Option<WindowInfo>) {
        self.processes.lock().unwrap().push(FakeProcess {
            pid,
            name: name.to_string(),
            window,
        });
    }

    pub(crate) fn exit(&self, name: &str) {
        let stem = process_stem(name);
        self.processes
            .lock()
            .unwrap()
            .retain(|p| process_stem(&p.name) != stem);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

impl ProcessDirectory for FakeProcesses {
    fn find_by_name(&self, name: &str) -> Result<Vec<ProcessRef>> {
        if *self.failing.lock().unwrap() {
            return Err(LaunchError::AccessDenied {
                pid: 0,
                message: "fake denial".to_string(),
            });
        }
        let stem = process_stem(name);
        Ok(self
            .processes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| process_stem(&p.name) == stem)
            .map(|p| ProcessRef {
                pid: p.pid,
                name: p.name.clone(),
            })
            .collect())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.processes.lock().unwrap().iter().any(|p| p.pid == pid)
    }

    fn kill(&self, name: &str) -> Result<usize> {
        let before = self.processes.lock().unwrap().len();
        self.exit(name);
        Ok(before - self.processes.lock().unwrap().len())
    }

    fn set_affinity(&self, pid: u32, mask: AffinityMask) -> Result<()> {
        self.affinity.lock().unwrap().insert(pid, mask);
        Ok(())
    }

    fn set_priority(&self, pid: u32, priority: ProcessPriority) -> Result<()> {
        self.priority.lock().unwrap().insert(pid, priority);
        Ok(())
    }
}

impl WindowInspector for FakeProcesses {
    fn main_window(&self, pid: u32) -> Result<Option<WindowInfo>> {
        Ok(self
            .processes
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.pid == pid)
            .and_then(|p| p.window.clone()))
    }

    fn minimize(&self, _window: &WindowInfo) -> Result<()> {
        Ok(())
    }
}
