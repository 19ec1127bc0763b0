use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// Domain-specific errors for Script Buttons
#[derive(Error, Debug)]
pub enum ScriptButtonsError {
    /// A run is already registered under this key. `RunRegistry::start`
    /// never overwrites silently; the controller converts this into a stop.
    #[error("script is already running: {key}")]
    AlreadyRunning { key: String },

    /// The task engine rejected the launch. The registry is left untouched
    /// when this surfaces.
    #[error("failed to launch '{command}': {message}")]
    EngineStart { command: String, message: String },

    /// A directory or manifest could not be read during package-manager
    /// detection. Always recovered inside the walk; detection falls back
    /// to npm rather than surfacing this.
    #[error("package manager detection failed in {}: {source}", .dir.display())]
    Detection {
        dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// History persistence failed. Propagates and aborts the in-progress
    /// operation; the stored list reflects only prior successful writes.
    #[error("history persistence failed: {0}")]
    Persistence(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ScriptButtonsError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the user doesn't need to know.
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
