//! Error types for the task core.

use crate::task::TaskId;

/// Errors surfaced synchronously to callers of lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Input rejected before any mutation happened.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No stored task matches the identifier.
    #[error("task not found: {0}")]
    NotFound(TaskId),
}

/// Failures reported by a [`crate::store::TaskStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no stored task with id {0}")]
    NotFound(TaskId),

    #[error("task store I/O failure: {0}")]
    Io(String),

    /// Persisted data could not be decoded.
    #[error("task store data is corrupt: {0}")]
    Corrupt(String),

    #[error("task store engine error: {0}")]
    Engine(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure talking to a reminder dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reminder dispatcher error: {0}")]
pub struct DispatchError(pub String);
