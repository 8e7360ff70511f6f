//! Task error taxonomy.
//!
//! Errors that happen before a task id exists are returned to the caller.
//! Failures inside a running child are never errors: they surface as the
//! `failed` status plus whatever output was captured.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    /// The command could not be started (missing executable, permission denied).
    #[error("Failed to launch '{program}': {source}. Is it installed?")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Task directory or capture files could not be created, written or read.
    #[error("Task storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `check_result` was given an id that is neither in memory nor on disk.
    #[error("Task {0} not found")]
    NotFound(String),
}

impl TaskError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Whether this is the caller's fault rather than the host's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TaskError::NotFound(_))
    }
}

pub type TaskResult<T> = Result<T, TaskError>;
