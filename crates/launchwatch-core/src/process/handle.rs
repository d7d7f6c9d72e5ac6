//! A resolved reference to one external process.

use super::classify::{ProcessKind, WindowClassifier, WindowInfo};
use super::directory::{ProcessDirectory, ProcessRef, WindowInspector};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a monitor reports about the process it saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub window: Option<WindowInfo>,
    pub kind: ProcessKind,
}

/// Identifies a target to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    /// Executable path or URI that was launched.
    pub target: String,
    /// Process to search for instead of the launched executable.
    pub monitor_name: Option<String>,
}

impl ProcessDescriptor {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            monitor_name: None,
        }
    }

    pub fn with_monitor_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.monitor_name = (!name.trim().is_empty()).then_some(name);
        self
    }

    /// Name the process table is searched for.
    pub fn search_name(&self) -> &str {
        self.monitor_name.as_deref().unwrap_or(&self.target)
    }
}

/// Owns the current resolution of a process name to a live process.
///
/// OS failures never escape: a refused query is logged and the handle simply
/// reports "not found" until the next refresh.
pub struct ProcessHandle {
    name: String,
    directory: Arc<dyn ProcessDirectory>,
    windows: Arc<dyn WindowInspector>,
    classifier: Arc<dyn WindowClassifier>,
    current: Option<ProcessRef>,
    window: Option<WindowInfo>,
}

impl ProcessHandle {
    pub fn new(
        name: impl Into<String>,
        directory: Arc<dyn ProcessDirectory>,
        windows: Arc<dyn WindowInspector>,
        classifier: Arc<dyn WindowClassifier>,
    ) -> Self {
        Self {
            name: name.into(),
            directory,
            windows,
            classifier,
            current: None,
            window: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.pid)
    }

    /// Re-resolve the process by name.
    ///
    /// `name_hint` replaces the handle's own name for this lookup. Among
    /// several candidates, one presenting a usable window wins. Returns
    /// whether any candidate was found.
    pub fn refresh(&mut self, name_hint: Option<&str>) -> bool {
        let name = name_hint.unwrap_or(&self.name).to_string();

        let candidates = match self.directory.find_by_name(&name) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Process lookup for '{}' failed: {}", name, e);
                self.clear();
                return false;
            }
        };

        let mut fallback = None;
        for candidate in candidates {
            let window = self.lookup_window(candidate.pid);
            if window.as_ref().is_some_and(|w| self.window_is_usable(w)) {
                self.current = Some(candidate);
                self.window = window;
                return true;
            }
            if fallback.is_none() {
                fallback = Some((candidate, window));
            }
        }

        match fallback {
            Some((candidate, window)) => {
                self.current = Some(candidate);
                self.window = window;
                true
            }
            None => {
                self.clear();
                false
            }
        }
    }

    fn clear(&mut self) {
        self.current = None;
        self.window = None;
    }

    fn lookup_window(&self, pid: u32) -> Option<WindowInfo> {
        match self.windows.main_window(pid) {
            Ok(window) => window,
            Err(e) => {
                debug!("Window lookup for process {} failed: {}", pid, e);
                None
            }
        }
    }

    fn window_is_usable(&self, window: &WindowInfo) -> bool {
        window.handle != 0
            && !window.title.is_empty()
            && self.classifier.classify(window) != ProcessKind::Excluded
    }

    /// The OS still reports the resolved process.
    pub fn is_alive(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|p| self.directory.is_alive(p.pid))
    }

    /// Classification of the process's top-level window.
    pub fn kind(&self) -> ProcessKind {
        self.window
            .as_ref()
            .map(|w| self.classifier.classify(w))
            .unwrap_or(ProcessKind::Unclassified)
    }

    /// Alive and presenting a real window.
    ///
    /// Helper and splash processes that share the target's name fail this,
    /// as do windows classified `Excluded`.
    pub fn is_valid(&self) -> bool {
        self.is_alive()
            && self
                .window
                .as_ref()
                .is_some_and(|w| self.window_is_usable(w))
    }

    pub fn snapshot(&self) -> Option<ProcessSnapshot> {
        self.current.as_ref().map(|p| ProcessSnapshot {
            pid: p.pid,
            name: p.name.clone(),
            window: self.window.clone(),
            kind: self.kind(),
        })
    }
}
