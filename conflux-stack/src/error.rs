//! Error types for stacking

use conflux_core::DrillError;
use conflux_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Drill(#[from] DrillError),

    /// A table carried no `{drill, date}` metadata
    #[error("Table has no drill metadata: {0}")]
    MissingMetadata(String),

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(String),

    /// CSV encoding failure
    #[error("CSV error: {0}")]
    Csv(String),

    /// A blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StackError {
    pub fn missing_metadata(msg: impl Into<String>) -> Self {
        Self::MissingMetadata(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<rusqlite::Error> for StackError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<csv::Error> for StackError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for StackError {
    fn from(err: serde_json::Error) -> Self {
        Self::Database(format!("bad stored payload: {err}"))
    }
}

impl From<tokio::task::JoinError> for StackError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type for stacking operations
pub type Result<T> = std::result::Result<T, StackError>;
