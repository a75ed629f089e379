//! Error types for the queue worker

use conflux_core::DrillError;
use conflux_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Drill failure; only [`DrillError::is_recoverable`] ones are dead-lettered
    #[error(transparent)]
    Drill(#[from] DrillError),

    /// Output store failure (always fatal)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Queue service failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Entries still unacknowledged after every batch retry
    #[error("{} entries unacknowledged on queue '{queue}': {}", ids.len(), ids.join(", "))]
    Unacknowledged { queue: String, ids: Vec<String> },

    /// Invalid worker or queue configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WorkerError {
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the message should be moved to the dead-letter queue instead
    /// of stopping the worker.
    pub fn is_dead_letter(&self) -> bool {
        matches!(self, Self::Drill(e) if e.is_recoverable())
    }
}

/// Result type for worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;
