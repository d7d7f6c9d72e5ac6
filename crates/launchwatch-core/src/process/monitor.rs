//! Per-target acquisition monitor.
//!
//! A [`ProcessMonitor`] polls one [`ProcessHandle`] on a fixed tick and turns
//! what it sees into three events:
//!
//! - `Acquired`: a live process with a real window was observed
//! - `SoftExit`: an acquired process disappeared; it has `inner_timeout` to
//!   come back
//! - `HardExit`: the active horizon elapsed without (re)acquisition; the
//!   monitor is `Stopped` afterwards
//!
//! Two horizons exist because first acquisition may legitimately take minutes
//! (update dialogs, slow loads) while a process relaunching itself should
//! reappear within seconds.
//!
//! Each monitor runs one tokio task. The session state sits behind a
//! monitor-local async mutex, held across each refresh+decide step, so ticks
//! never overlap and no event is emitted once [`ProcessMonitor::stop`] has
//! returned. The step itself queries the OS process table, so it runs on the
//! blocking pool with the lock guard moved into it.

use super::classify::ProcessKind;
use super::handle::{ProcessDescriptor, ProcessHandle, ProcessSnapshot};
use crate::config::MonitorDefaults;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Monitor lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    /// Lost an acquired process; waiting out the inner horizon.
    Searching,
    /// Waiting for first acquisition under the global horizon.
    Monitoring,
    Acquired,
    /// Terminal until [`ProcessMonitor::restart`].
    Stopped,
}

/// Events emitted by a monitor, strictly ordered per monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Acquired {
        target: String,
        process: ProcessSnapshot,
    },
    SoftExit {
        target: String,
        last: Option<ProcessSnapshot>,
        reacquire_within: Duration,
    },
    HardExit {
        target: String,
        /// Time since the monitor (re)started.
        elapsed: Duration,
        last: Option<ProcessSnapshot>,
    },
}

impl MonitorEvent {
    pub fn target(&self) -> &str {
        match self {
            MonitorEvent::Acquired { target, .. }
            | MonitorEvent::SoftExit { target, .. }
            | MonitorEvent::HardExit { target, .. } => target,
        }
    }
}

/// Tick interval and the two timeout horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub tick: Duration,
    pub global_timeout: Duration,
    pub inner_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick: MonitorDefaults::TICK_INTERVAL,
            global_timeout: MonitorDefaults::GLOBAL_TIMEOUT,
            inner_timeout: MonitorDefaults::INNER_TIMEOUT,
        }
    }
}

impl MonitorConfig {
    pub fn with_timeouts(global_timeout: Duration, inner_timeout: Duration) -> Self {
        Self {
            global_timeout,
            inner_timeout,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Horizon {
    Global,
    Inner,
}

struct MonitorSession {
    handle: ProcessHandle,
    target: String,
    name_hint: Option<String>,
    config: MonitorConfig,
    phase: MonitorPhase,
    acquired: bool,
    horizon: Horizon,
    started: Instant,
    phase_started: Instant,
    last_seen: Option<ProcessSnapshot>,
}

impl MonitorSession {
    fn reset(&mut self, now: Instant) {
        self.phase = MonitorPhase::Monitoring;
        self.acquired = false;
        self.horizon = Horizon::Global;
        self.started = now;
        self.phase_started = now;
    }

    fn tick(&mut self, now: Instant) -> Option<MonitorEvent> {
        if self.phase == MonitorPhase::Stopped {
            return None;
        }

        self.handle.refresh(self.name_hint.as_deref());
        let valid = self.handle.is_valid();
        if valid {
            self.last_seen = self.handle.snapshot();
        }

        if self.acquired {
            if valid {
                return None;
            }
            self.acquired = false;
            self.phase = MonitorPhase::Searching;
            self.horizon = Horizon::Inner;
            self.phase_started = now;
            info!(
                "Lost '{}', will try to reacquire within {:?}",
                self.target, self.config.inner_timeout
            );
            return Some(MonitorEvent::SoftExit {
                target: self.target.clone(),
                last: self.last_seen.clone(),
                reacquire_within: self.config.inner_timeout,
            });
        }

        if valid {
            if let Some(process) = self.last_seen.clone() {
                self.acquired = true;
                self.phase = MonitorPhase::Acquired;
                self.phase_started = now;
                info!(
                    "Acquired '{}' (pid {}, kind {})",
                    self.target, process.pid, process.kind
                );
                return Some(MonitorEvent::Acquired {
                    target: self.target.clone(),
                    process,
                });
            }
        }

        let limit = match self.horizon {
            Horizon::Global => self.config.global_timeout,
            Horizon::Inner => self.config.inner_timeout,
        };
        let waited = now.duration_since(self.phase_started);
        if waited < limit {
            debug!("Still waiting for '{}' ({:?} of {:?})", self.target, waited, limit);
            return None;
        }

        self.phase = MonitorPhase::Stopped;
        let elapsed = now.duration_since(self.started);
        warn!(
            "Gave up on '{}' after {:?} ({:?} horizon elapsed)",
            self.target, elapsed, self.horizon
        );
        Some(MonitorEvent::HardExit {
            target: self.target.clone(),
            elapsed,
            last: self.last_seen.clone(),
        })
    }
}

struct Shared {
    session: Arc<Mutex<MonitorSession>>,
    events: mpsc::UnboundedSender<MonitorEvent>,
    tick: Duration,
}

/// Handle to a running monitor task.
///
/// Dropping the monitor aborts its task.
pub struct ProcessMonitor {
    shared: Arc<Shared>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ProcessMonitor {
    /// Start monitoring. Must be called from within a tokio runtime.
    ///
    /// The first tick runs immediately; events go to `events`.
    pub fn spawn(
        descriptor: &ProcessDescriptor,
        handle: ProcessHandle,
        config: MonitorConfig,
        events: mpsc::UnboundedSender<MonitorEvent>,
    ) -> Self {
        let now = Instant::now();
        let session = MonitorSession {
            handle,
            target: descriptor.search_name().to_string(),
            name_hint: descriptor.monitor_name.clone(),
            config,
            phase: MonitorPhase::Monitoring,
            acquired: false,
            horizon: Horizon::Global,
            started: now,
            phase_started: now,
            last_seen: None,
        };

        let shared = Arc::new(Shared {
            session: Arc::new(Mutex::new(session)),
            events,
            tick: config.tick,
        });

        let monitor = Self {
            task: std::sync::Mutex::new(Some(Self::start_task(&shared))),
            shared,
        };
        debug!("Monitor started for '{}'", descriptor.search_name());
        monitor
    }

    fn start_task(shared: &Arc<Shared>) -> JoinHandle<()> {
        tokio::spawn(Self::run(Arc::clone(shared)).instrument(info_span!("process_monitor")))
    }

    async fn run(shared: Arc<Shared>) {
        let mut interval = tokio::time::interval(shared.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let mut session = Arc::clone(&shared.session).lock_owned().await;
            let events = shared.events.clone();
            let span = Span::current();
            let now = Instant::now();
            let step = tokio::task::spawn_blocking(move || {
                span.in_scope(|| {
                    if let Some(event) = session.tick(now) {
                        // A dropped receiver only means nobody is listening anymore.
                        let _ = events.send(event);
                    }
                    session.phase == MonitorPhase::Stopped
                })
            });

            match step.await {
                Ok(false) => {}
                Ok(true) => break,
                Err(e) => {
                    error!("Monitor tick failed: {}", e);
                    break;
                }
            }
        }
    }

    fn abort_task(&self) {
        let mut slot = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(task) = slot.take() {
            task.abort();
        }
    }

    /// Halt ticking and mark the session `Stopped`. Idempotent.
    ///
    /// Waits for an in-flight tick to finish; nothing is emitted afterwards.
    pub async fn stop(&self) {
        {
            let mut session = self.shared.session.lock().await;
            if session.phase != MonitorPhase::Stopped {
                session.phase = MonitorPhase::Stopped;
                info!("Monitor for '{}' stopped", session.target);
            }
        }
        self.abort_task();
    }

    /// Clear acquisition state and monitor again from the top under the
    /// global horizon.
    pub async fn restart(&self) {
        {
            let mut session = self.shared.session.lock().await;
            session.reset(Instant::now());
            info!("Monitor for '{}' restarted", session.target);
        }
        self.abort_task();
        let task = Self::start_task(&self.shared);
        *self.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);
    }

    pub async fn phase(&self) -> MonitorPhase {
        self.shared.session.lock().await.phase
    }

    /// Last valid process observed, kept after it exits.
    pub async fn last_seen(&self) -> Option<ProcessSnapshot> {
        self.shared.session.lock().await.last_seen.clone()
    }

    /// Current classification of the monitored process's window.
    pub async fn kind(&self) -> ProcessKind {
        self.shared.session.lock().await.handle.kind()
    }

    pub async fn target(&self) -> String {
        self.shared.session.lock().await.target.clone()
    }
}

impl Drop for ProcessMonitor {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::AffinityMask;
    use crate::error::Result;
    use crate::process::test_support::FakeProcesses;
    use crate::process::{ProcessDirectory, ProcessPriority, ProcessRef, WindowInfo, WindowTable};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Directory whose lookups park until the test lets them through.
    struct GatedDirectory {
        inner: Arc<FakeProcesses>,
        entered: mpsc::UnboundedSender<()>,
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        in_flight: AtomicUsize,
        overlapped: AtomicBool,
    }

    impl ProcessDirectory for GatedDirectory {
        fn find_by_name(&self, name: &str) -> Result<Vec<ProcessRef>> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            let _ = self.entered.send(());
            let _ = self.release.lock().unwrap().recv();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.find_by_name(name)
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.inner.is_alive(pid)
        }

        fn kill(&self, name: &str) -> Result<usize> {
            self.inner.kill(name)
        }

        fn set_affinity(&self, pid: u32, mask: AffinityMask) -> Result<()> {
            self.inner.set_affinity(pid, mask)
        }

        fn set_priority(&self, pid: u32, priority: ProcessPriority) -> Result<()> {
            self.inner.set_priority(pid, priority)
        }
    }

    fn game_window() -> Option<WindowInfo> {
        Some(WindowInfo::new(42, "My Game", "GameWnd"))
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            tick: Duration::from_secs(1),
            global_timeout: Duration::from_secs(5),
            inner_timeout: Duration::from_secs(3),
        }
    }

    fn spawn_monitor(
        fake: &Arc<FakeProcesses>,
        name: &str,
    ) -> (ProcessMonitor, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ProcessHandle::new(name, fake.clone(), fake.clone(), Arc::new(WindowTable));
        let monitor = ProcessMonitor::spawn(&ProcessDescriptor::new(name), handle, config(), tx);
        (monitor, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn names(events: &[MonitorEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                MonitorEvent::Acquired { .. } => "acquired",
                MonitorEvent::SoftExit { .. } => "soft",
                MonitorEvent::HardExit { .. } => "hard",
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_acquired_emits_one_hard_exit() {
        let fake = Arc::new(FakeProcesses::new());
        let (monitor, mut rx) = spawn_monitor(&fake, "Game");

        assert_eq!(monitor.phase().await, MonitorPhase::Monitoring);
        sleep(Duration::from_millis(5500)).await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), ["hard"]);
        match &events[0] {
            MonitorEvent::HardExit { elapsed, last, .. } => {
                assert_eq!(*elapsed, Duration::from_secs(5));
                assert!(last.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(monitor.phase().await, MonitorPhase::Stopped);

        // A late appearance changes nothing.
        fake.start("Game", 1, game_window());
        sleep(Duration::from_secs(10)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(monitor.phase().await, MonitorPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacquire_within_inner_timeout() {
        let fake = Arc::new(FakeProcesses::new());
        let (monitor, mut rx) = spawn_monitor(&fake, "Game");

        sleep(Duration::from_millis(1500)).await;
        fake.start("Game", 7, game_window());
        sleep(Duration::from_secs(2)).await;
        assert_eq!(monitor.phase().await, MonitorPhase::Acquired);

        fake.exit("Game");
        sleep(Duration::from_secs(1)).await;
        assert_eq!(monitor.phase().await, MonitorPhase::Searching);

        fake.start("Game", 8, game_window());
        sleep(Duration::from_secs(10)).await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), ["acquired", "soft", "acquired"]);
        match &events[2] {
            MonitorEvent::Acquired { process, .. } => assert_eq!(process.pid, 8),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(monitor.phase().await, MonitorPhase::Acquired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_exit_without_return_becomes_hard_exit() {
        let fake = Arc::new(FakeProcesses::new());
        fake.start("Game", 3, game_window());
        let (monitor, mut rx) = spawn_monitor(&fake, "Game");

        sleep(Duration::from_millis(500)).await;
        fake.exit("Game");
        sleep(Duration::from_secs(10)).await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), ["acquired", "soft", "hard"]);
        match &events[2] {
            MonitorEvent::HardExit { last, .. } => {
                assert_eq!(last.as_ref().map(|p| p.pid), Some(3));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(monitor.phase().await, MonitorPhase::Stopped);
        assert_eq!(monitor.last_seen().await.map(|p| p.pid), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_silences_events() {
        let fake = Arc::new(FakeProcesses::new());
        let (monitor, mut rx) = spawn_monitor(&fake, "Game");

        sleep(Duration::from_millis(1500)).await;
        monitor.stop().await;
        monitor.stop().await;
        assert_eq!(monitor.phase().await, MonitorPhase::Stopped);

        fake.start("Game", 1, game_window());
        sleep(Duration::from_secs(20)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(monitor.phase().await, MonitorPhase::Stopped);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_tick() {
        let fake = Arc::new(FakeProcesses::new());
        fake.start("Game", 5, game_window());

        let (entered_tx, mut entered) = mpsc::unbounded_channel();
        let (release, release_rx) = std::sync::mpsc::channel();
        let gated = Arc::new(GatedDirectory {
            inner: fake.clone(),
            entered: entered_tx,
            release: std::sync::Mutex::new(release_rx),
            in_flight: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ProcessHandle::new("Game", gated.clone(), fake.clone(), Arc::new(WindowTable));
        let fast = MonitorConfig {
            tick: Duration::from_millis(10),
            ..config()
        };
        let monitor = ProcessMonitor::spawn(&ProcessDescriptor::new("Game"), handle, fast, tx);

        // First tick is parked inside the process lookup.
        entered.recv().await.unwrap();
        let mut stopping = Box::pin(monitor.stop());
        assert!(tokio::time::timeout(Duration::from_millis(100), &mut stopping)
            .await
            .is_err());
        assert!(rx.try_recv().is_err());

        release.send(()).unwrap();
        stopping.await;

        // The parked tick finished before stop returned; nothing follows it.
        assert_eq!(names(&drain(&mut rx)), ["acquired"]);
        drop(release);
        sleep(Duration::from_millis(100)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(entered.try_recv().is_err());
        assert_eq!(monitor.phase().await, MonitorPhase::Stopped);
        assert!(!gated.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_hard_exit() {
        let fake = Arc::new(FakeProcesses::new());
        let (monitor, mut rx) = spawn_monitor(&fake, "Game");

        sleep(Duration::from_secs(6)).await;
        assert_eq!(names(&drain(&mut rx)), ["hard"]);

        fake.start("Game", 9, game_window());
        monitor.restart().await;
        sleep(Duration::from_millis(500)).await;

        assert_eq!(names(&drain(&mut rx)), ["acquired"]);
        assert_eq!(monitor.phase().await, MonitorPhase::Acquired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excluded_window_never_acquires() {
        let fake = Arc::new(FakeProcesses::new());
        fake.start(
            "Battle.net",
            4,
            Some(WindowInfo::new(2, "Battle.net Login", "Qt5QWindowIcon")),
        );
        let (monitor, mut rx) = spawn_monitor(&fake, "Battle.net");

        sleep(Duration::from_secs(6)).await;
        assert_eq!(names(&drain(&mut rx)), ["hard"]);
        assert_eq!(monitor.kind().await, ProcessKind::Excluded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_name_redirects_search() {
        let fake = Arc::new(FakeProcesses::new());
        fake.start("RealGame", 12, game_window());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let descriptor = ProcessDescriptor::new("Stub.exe").with_monitor_name("RealGame.exe");
        let handle = ProcessHandle::new(
            descriptor.target.clone(),
            fake.clone(),
            fake.clone(),
            Arc::new(WindowTable),
        );
        let monitor = ProcessMonitor::spawn(&descriptor, handle, config(), tx);

        sleep(Duration::from_millis(500)).await;
        let events = drain(&mut rx);
        assert_eq!(names(&events), ["acquired"]);
        assert_eq!(events[0].target(), "RealGame.exe");
        assert_eq!(monitor.target().await, "RealGame.exe");
    }
}
