//! Error types for launchwatch.
//!
//! Most failures in a supervised run are not errors at all: a process that
//! never shows up is a `HardExit` event, and a refused OS call becomes "not
//! alive" for one tick. The variants here cover what remains: I/O and
//! settings failures, launch failures, and the one fatal condition.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the launchwatch library.
#[derive(Debug, Error)]
pub enum LaunchError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Process errors
    #[error("Process launch failed for {target}: {message}")]
    LaunchFailed { target: String, message: String },

    #[error("Access denied to process {pid}: {message}")]
    AccessDenied { pid: u32, message: String },

    #[error("Not supported on {platform}: {operation}")]
    Unsupported {
        platform: &'static str,
        operation: String,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    /// No game path or URI configured; the run cannot do anything useful.
    #[error("No valid game path or URI configured")]
    MissingGamePath,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for launchwatch operations.
pub type Result<T> = std::result::Result<T, LaunchError>;

impl From<std::io::Error> for LaunchError {
    fn from(err: std::io::Error) -> Self {
        LaunchError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LaunchError {
    fn from(err: serde_json::Error) -> Self {
        LaunchError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl LaunchError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LaunchError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an error for an operation the current platform cannot perform.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        LaunchError::Unsupported {
            platform: crate::platform::current_platform(),
            operation: operation.into(),
        }
    }

    /// Whether this error must end the run outright.
    ///
    /// Everything else is absorbed by the stage that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LaunchError::MissingGamePath)
    }
}
