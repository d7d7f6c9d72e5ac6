//! The run itself.

use super::plan::{GameStage, HookStage, LaunchPlan, LauncherStage};
use super::{Collaborators, LauncherOutcome, RunReport};
use crate::error::{LaunchError, Result};
use crate::process::{
    LaunchStrategy, MonitorEvent, ProcessDescriptor, ProcessDirectory, ProcessHandle, ProcessKind,
    ProcessMonitor, ProcessPriority, ProcessRef, StageCommand, StageTarget,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A monitor together with its event stream.
struct Watch {
    monitor: ProcessMonitor,
    events: mpsc::UnboundedReceiver<MonitorEvent>,
}

impl Watch {
    async fn stop(&self) {
        self.monitor.stop().await;
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Next event of an optional watch; pends forever without one.
async fn next_event(watch: &mut Option<Watch>) -> Option<MonitorEvent> {
    match watch {
        Some(watch) => watch.events.recv().await,
        None => std::future::pending().await,
    }
}

/// Runs one [`LaunchPlan`] from pre-launch through cleanup.
pub struct LaunchOrchestrator {
    plan: LaunchPlan,
    collaborators: Collaborators,
}

impl LaunchOrchestrator {
    pub fn new(plan: LaunchPlan, collaborators: Collaborators) -> Self {
        Self {
            plan,
            collaborators,
        }
    }

    /// Execute every stage in order.
    ///
    /// Stage failures are logged and recorded in the report. The only error
    /// returned is [`LaunchError::MissingGamePath`], after the presenter has
    /// been told.
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();

        let Some(game) = self.plan.game.as_ref() else {
            error!(category = "game", "No game path or URI configured; aborting");
            self.collaborators.presenter.notify(
                "Nothing to launch",
                "Set a game path or game URI in the settings and try again.",
            );
            self.collaborators.presenter.release();
            return Err(LaunchError::MissingGamePath);
        };

        if let Some(hook) = &self.plan.pre_launch {
            self.run_hook("pre-launch", hook).await;
        }

        let mut launcher = self.launcher_stage(&mut report).await;
        if report.launcher == LauncherOutcome::HardExit {
            warn!(category = "launcher", "Launcher never came up; ending the run");
            self.cleanup(&mut report, launcher.as_ref(), None).await;
            return Ok(report);
        }

        let game_watch = self.game_stage(game, &mut report).await;
        if let Some(mut watch) = game_watch {
            self.supervise_game(&mut watch, &mut launcher, &mut report)
                .await;
            watch.stop().await;
            self.post_game(&mut report).await;
            self.cleanup(&mut report, launcher.as_ref(), Some(&watch))
                .await;
        } else {
            self.post_game(&mut report).await;
            self.cleanup(&mut report, launcher.as_ref(), None).await;
        }

        Ok(report)
    }

    /// Run a process-table call on the blocking pool.
    async fn on_directory<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ProcessDirectory) -> Result<T> + Send + 'static,
    {
        let directory = Arc::clone(&self.collaborators.directory);
        tokio::task::spawn_blocking(move || call(directory.as_ref()))
            .await
            .map_err(|e| LaunchError::Other(format!("Process directory task failed: {}", e)))?
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<ProcessRef>> {
        let name = name.to_string();
        self.on_directory(move |directory| directory.find_by_name(&name))
            .await
    }

    async fn kill(&self, name: &str) -> Result<usize> {
        let name = name.to_string();
        self.on_directory(move |directory| directory.kill(&name)).await
    }

    fn watch(&self, descriptor: &ProcessDescriptor) -> Watch {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ProcessHandle::new(
            descriptor.target.clone(),
            self.collaborators.directory.clone(),
            self.collaborators.windows.clone(),
            self.collaborators.classifier.clone(),
        );
        Watch {
            monitor: ProcessMonitor::spawn(descriptor, handle, self.plan.timing.monitor, tx),
            events: rx,
        }
    }

    async fn run_hook(&self, label: &str, hook: &HookStage) {
        pause(hook.delay).await;
        info!(category = "hook", "Running {} hook {}", label, hook.command.target);
        match self.collaborators.spawner.run_to_exit(&hook.command).await {
            Ok(code) => info!(category = "hook", "{} hook finished (exit code {:?})", label, code),
            Err(e) => warn!(category = "hook", "{} hook failed: {}", label, e),
        }
    }

    async fn launcher_stage(&self, report: &mut RunReport) -> Option<Watch> {
        if self.plan.options.skip_launcher {
            info!(category = "launcher", "Launcher disabled; skipping");
            return None;
        }
        let Some(stage) = self.plan.launcher.as_ref() else {
            info!(category = "launcher", "No launchable launcher configured; skipping");
            return None;
        };

        let name = stage.process_name();
        let running = match self.find_by_name(&name).await {
            Ok(found) => !found.is_empty(),
            Err(e) => {
                warn!(category = "launcher", "Could not look up '{}': {}", name, e);
                false
            }
        };

        if running && self.plan.options.relaunch_launcher {
            info!(category = "launcher", "'{}' already running; relaunching", name);
            if let Err(e) = self.kill(&name).await {
                warn!(category = "launcher", "Failed to close '{}': {}", name, e);
            }
        }

        if !running || self.plan.options.relaunch_launcher {
            if let Err(e) = self.collaborators.spawner.start(&stage.command).await {
                error!(category = "launcher", "Failed to start launcher: {}", e);
                report.launcher = LauncherOutcome::StartFailed;
                return None;
            }
        } else {
            info!(category = "launcher", "'{}' already running; attaching", name);
        }

        let descriptor = ProcessDescriptor::new(stage.executable.to_string_lossy());
        let mut watch = self.watch(&descriptor);
        self.await_launcher(stage, &mut watch, report).await;
        Some(watch)
    }

    async fn await_launcher(&self, stage: &LauncherStage, watch: &mut Watch, report: &mut RunReport) {
        loop {
            match watch.events.recv().await {
                Some(MonitorEvent::Acquired { process, .. }) => {
                    report.launcher_pid = Some(process.pid);
                    debug!(
                        category = "launcher",
                        "Waiting {:?} for the launcher to settle",
                        self.plan.timing.launcher_stabilization
                    );
                    pause(self.plan.timing.launcher_stabilization).await;

                    let kind = watch.monitor.kind().await;
                    info!(
                        category = "launcher",
                        "Launcher {} is up (pid {}, kind {})",
                        stage.executable.display(),
                        process.pid,
                        kind
                    );
                    report.launcher_kind = Some(kind);
                    report.launcher = LauncherOutcome::Acquired;
                    return;
                }
                Some(MonitorEvent::SoftExit { .. }) => continue,
                Some(MonitorEvent::HardExit { elapsed, .. }) => {
                    warn!(
                        category = "launcher",
                        "Launcher {} not found after {:?}",
                        stage.executable.display(),
                        elapsed
                    );
                    report.launcher = LauncherOutcome::HardExit;
                    watch.stop().await;
                    return;
                }
                None => {
                    report.launcher = LauncherOutcome::HardExit;
                    return;
                }
            }
        }
    }

    /// Command that starts the game, given how the launcher wants it done.
    fn game_command(&self, game: &GameStage, kind: Option<ProcessKind>) -> Option<StageCommand> {
        let strategy = kind.map_or(LaunchStrategy::Direct, |k| k.launch_strategy());

        match strategy {
            LaunchStrategy::Uri => {
                if let Some(uri) = &game.uri {
                    return Some(StageCommand::new(StageTarget::Uri(uri.clone())));
                }
            }
            LaunchStrategy::LauncherMediated => {
                let launcher_path = self
                    .plan
                    .launcher
                    .as_ref()
                    .and_then(|l| l.command.target.as_path());
                if let Some(path) = launcher_path {
                    return Some(
                        StageCommand::new(StageTarget::Path(path.to_path_buf()))
                            .with_args(game.args.clone()),
                    );
                }
            }
            LaunchStrategy::Direct => {}
        }

        match (&game.path, &game.uri) {
            (Some(path), _) => {
                let target = StageTarget::parse(&path.to_string_lossy())?;
                Some(StageCommand::new(target).with_args(game.args.clone()))
            }
            (None, Some(uri)) => Some(StageCommand::new(StageTarget::Uri(uri.clone()))),
            (None, None) => None,
        }
    }

    async fn game_stage(&self, game: &GameStage, report: &mut RunReport) -> Option<Watch> {
        let launcher_up = report.launcher == LauncherOutcome::Acquired;

        if launcher_up || self.plan.options.auto_game_launch {
            pause(game.delay).await;
            match self.game_command(game, report.launcher_kind) {
                Some(command) => {
                    info!(category = "game", "Starting game via {}", command.target);
                    match self.collaborators.spawner.start(&command).await {
                        Ok(_) => report.game_started = true,
                        Err(e) => error!(category = "game", "Failed to start game: {}", e),
                    }
                }
                None => warn!(category = "game", "No way to start the game"),
            }
        } else {
            info!(
                category = "game",
                "Launcher not confirmed and auto launch is off; waiting for the game to be started manually"
            );
        }

        match &game.monitor {
            Some(descriptor) => Some(self.watch(descriptor)),
            None => {
                warn!(category = "game", "No game executable to watch; continuing to post-game");
                None
            }
        }
    }

    async fn supervise_game(
        &self,
        game: &mut Watch,
        launcher: &mut Option<Watch>,
        report: &mut RunReport,
    ) {
        loop {
            tokio::select! {
                event = game.events.recv() => match event {
                    Some(MonitorEvent::Acquired { process, .. }) => {
                        info!(category = "game", "Game is running (pid {})", process.pid);
                        report.game_acquired = true;
                        if !report.tuning_applied {
                            self.apply_tuning(process.pid).await;
                            report.tuning_applied = true;
                        }
                    }
                    Some(MonitorEvent::SoftExit { reacquire_within, .. }) => {
                        info!(category = "game", "Game went away; watching {:?} for it to return", reacquire_within);
                    }
                    Some(MonitorEvent::HardExit { elapsed, .. }) => {
                        if report.game_acquired {
                            info!(category = "game", "Game has exited; moving to post-game");
                        } else {
                            warn!(category = "game", "Game never appeared within {:?}; moving to post-game", elapsed);
                        }
                        return;
                    }
                    None => return,
                },
                Some(event) = next_event(launcher) => match event {
                    MonitorEvent::HardExit { .. } => {
                        info!(category = "launcher", "Launcher has exited");
                    }
                    other => debug!(category = "launcher", "Launcher event: {:?}", other),
                },
            }
        }
    }

    async fn apply_tuning(&self, pid: u32) {
        if !self.plan.affinity.is_disabled() {
            let mask = self.plan.affinity;
            match self
                .on_directory(move |directory| directory.set_affinity(pid, mask))
                .await
            {
                Ok(()) => info!(
                    category = "tuning",
                    "Set affinity of {} to cores {}", pid, self.plan.affinity
                ),
                Err(e) => warn!(category = "tuning", "Could not set affinity of {}: {}", pid, e),
            }
        }

        if self.plan.priority != ProcessPriority::Normal {
            let priority = self.plan.priority;
            match self
                .on_directory(move |directory| directory.set_priority(pid, priority))
                .await
            {
                Ok(()) => info!(
                    category = "tuning",
                    "Set priority of {} to {}", pid, self.plan.priority
                ),
                Err(e) => warn!(category = "tuning", "Could not set priority of {}: {}", pid, e),
            }
        }
    }

    async fn post_game(&self, report: &mut RunReport) {
        if self.plan.options.minimize_launcher {
            self.minimize_launcher(report);
        }

        if let Some(hook) = &self.plan.post_game {
            self.run_hook("post-game", hook).await;
            report.post_game_ran = true;
        }

        pause(self.plan.timing.post_game_cooldown).await;

        if self.plan.options.close_launcher {
            if let Some(stage) = &self.plan.launcher {
                report.launcher_closed = self.close_launcher(stage).await;
            }
        }
    }

    fn minimize_launcher(&self, report: &RunReport) {
        let Some(pid) = report.launcher_pid else {
            return;
        };
        let windows = &self.collaborators.windows;
        match windows.main_window(pid) {
            Ok(Some(window)) => {
                if let Err(e) = windows.minimize(&window) {
                    warn!(category = "launcher", "Could not minimize launcher: {}", e);
                }
            }
            Ok(None) => debug!(category = "launcher", "Launcher has no window to minimize"),
            Err(e) => warn!(category = "launcher", "Could not find launcher window: {}", e),
        }
    }

    async fn close_launcher(&self, stage: &LauncherStage) -> bool {
        let name = stage.process_name();

        match self.find_by_name(&name).await {
            Ok(found) if found.is_empty() => {
                debug!(category = "launcher", "'{}' already closed", name);
                false
            }
            Ok(_) => match self.kill(&name).await {
                Ok(count) => {
                    info!(category = "launcher", "Closed {} '{}' process tree(s)", count, name);
                    count > 0
                }
                Err(e) => {
                    warn!(category = "launcher", "Failed to close '{}': {}", name, e);
                    false
                }
            },
            Err(e) => {
                warn!(category = "launcher", "Could not look up '{}': {}", name, e);
                false
            }
        }
    }

    async fn cleanup(&self, report: &mut RunReport, launcher: Option<&Watch>, game: Option<&Watch>) {
        for watch in [launcher, game].into_iter().flatten() {
            watch.stop().await;
        }
        self.collaborators.presenter.release();
        report.finished = true;
        info!(category = "run", "Run finished: {:?}", report);
    }
}
