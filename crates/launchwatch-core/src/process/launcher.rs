//! Starting stage processes.
//!
//! Launchers and games are started detached: they belong to the user, not to
//! us, and must survive our exit. Pre-launch and post-game hooks are instead
//! awaited to completion.

#![cfg_attr(unix, allow(unsafe_code))]

use crate::error::{LaunchError, Result};
use crate::platform;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, error, info};

/// What a stage points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageTarget {
    Path(PathBuf),
    /// A protocol URI handed to the desktop, e.g. `com.epicgames.launcher://apps/...`.
    Uri(String),
}

impl StageTarget {
    /// Parse a configured value; anything with a scheme separator is a URI.
    ///
    /// Blank input yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else if value.contains("://") {
            Some(StageTarget::Uri(value.to_string()))
        } else {
            Some(StageTarget::Path(PathBuf::from(value)))
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, StageTarget::Uri(_))
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            StageTarget::Path(path) => Some(path),
            StageTarget::Uri(_) => None,
        }
    }
}

impl fmt::Display for StageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageTarget::Path(path) => write!(f, "{}", path.display()),
            StageTarget::Uri(uri) => f.write_str(uri),
        }
    }
}

/// A fully resolved command for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub target: StageTarget,
    pub args: Vec<String>,
    pub elevated: bool,
}

impl StageCommand {
    pub fn new(target: StageTarget) -> Self {
        Self {
            target,
            args: Vec::new(),
            elevated: false,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }
}

/// Starts external processes for the orchestrator.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Start detached. Returns the PID when one is known (URIs have none).
    async fn start(&self, command: &StageCommand) -> Result<Option<u32>>;

    /// Start and wait for exit with no timeout. Returns the exit code when
    /// the platform reports one.
    async fn run_to_exit(&self, command: &StageCommand) -> Result<Option<i32>>;
}

/// [`ProcessSpawner`] for the real OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpawner;

impl SystemSpawner {
    pub fn new() -> Self {
        Self
    }

    fn working_dir(path: &Path) -> Option<&Path> {
        path.parent().filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Program and argument list after applying elevation.
    fn resolve(path: &Path, command: &StageCommand) -> (PathBuf, Vec<String>) {
        if !command.elevated {
            return (path.to_path_buf(), command.args.clone());
        }

        #[cfg(windows)]
        {
            let mut script = format!(
                "Start-Process -FilePath '{}' -Verb RunAs",
                path.display().to_string().replace('\'', "''")
            );
            if !command.args.is_empty() {
                let quoted: Vec<String> = command
                    .args
                    .iter()
                    .map(|a| format!("'{}'", a.replace('\'', "''")))
                    .collect();
                script.push_str(&format!(" -ArgumentList {}", quoted.join(",")));
            }
            (
                PathBuf::from("powershell"),
                vec!["-NoProfile".to_string(), "-Command".to_string(), script],
            )
        }

        #[cfg(not(windows))]
        {
            let mut args = vec![path.display().to_string()];
            args.extend(command.args.iter().cloned());
            (PathBuf::from("pkexec"), args)
        }
    }

    fn require_path<'a>(command: &'a StageCommand) -> Result<&'a Path> {
        let path = command.target.as_path().ok_or_else(|| LaunchError::LaunchFailed {
            target: command.target.to_string(),
            message: "cannot wait on a URI".to_string(),
        })?;
        if !path.is_file() {
            return Err(LaunchError::LaunchFailed {
                target: path.display().to_string(),
                message: "executable not found".to_string(),
            });
        }
        Ok(path)
    }

    fn spawn_detached(path: &Path, command: &StageCommand) -> Result<u32> {
        let (program, args) = Self::resolve(path, command);
        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = Self::working_dir(path) {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            // SAFETY: setsid() is async-signal-safe; the child leaves our
            // session so closing us doesn't take it down.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", path.display(), e);
            LaunchError::LaunchFailed {
                target: path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        let pid = child.id().ok_or_else(|| LaunchError::LaunchFailed {
            target: path.display().to_string(),
            message: "process exited before its PID was read".to_string(),
        })?;

        // Reap on exit, otherwise a zombie keeps matching by name.
        let label = path.display().to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!("{} (PID {}) exited with {}", label, pid, status),
                Err(e) => debug!("Lost track of {} (PID {}): {}", label, pid, e),
            }
        });
        Ok(pid)
    }
}

#[async_trait]
impl ProcessSpawner for SystemSpawner {
    async fn start(&self, command: &StageCommand) -> Result<Option<u32>> {
        match &command.target {
            StageTarget::Uri(uri) => {
                info!("Opening {}", uri);
                let owned = uri.clone();
                tokio::task::spawn_blocking(move || platform::open_uri(&owned))
                    .await
                    .map_err(|e| LaunchError::LaunchFailed {
                        target: uri.clone(),
                        message: format!("URI opener task failed: {}", e),
                    })??;
                Ok(None)
            }
            StageTarget::Path(path) => {
                if !path.is_file() {
                    return Err(LaunchError::LaunchFailed {
                        target: path.display().to_string(),
                        message: "executable not found".to_string(),
                    });
                }
                info!(
                    "Starting {}{}",
                    path.display(),
                    if command.elevated { " (elevated)" } else { "" }
                );
                let pid = Self::spawn_detached(path, command)?;
                debug!("Started {} as PID {}", path.display(), pid);
                Ok(Some(pid))
            }
        }
    }

    async fn run_to_exit(&self, command: &StageCommand) -> Result<Option<i32>> {
        let path = Self::require_path(command)?;
        let (program, args) = Self::resolve(path, command);

        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(&args).stdin(Stdio::null());
        if let Some(dir) = Self::working_dir(path) {
            cmd.current_dir(dir);
        }

        info!("Running {} and waiting for it to exit", path.display());
        let status = cmd
            .status()
            .await
            .map_err(|e| LaunchError::LaunchFailed {
                target: path.display().to_string(),
                message: e.to_string(),
            })?;

        info!("{} exited with {}", path.display(), status);
        Ok(status.code())
    }
}
