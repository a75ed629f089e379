//! Error types for artifact storage

use conflux_core::DrillError;
use thiserror::Error;

/// Errors from artifact storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O or network error
    #[error("I/O error: {0}")]
    Io(String),

    /// Artifact not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Table could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Malformed path or root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 SDK error
    #[cfg(feature = "aws")]
    #[error("S3 error: {0}")]
    S3(String),

    /// Error raised by a downstream replicator
    #[error("Replication failed: {0}")]
    Replication(String),
}

impl StorageError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[cfg(feature = "aws")]
    pub fn s3(msg: impl Into<String>) -> Self {
        Self::S3(msg.into())
    }

    pub fn replication(msg: impl Into<String>) -> Self {
        Self::Replication(msg.into())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<arrow::error::ArrowError> for StorageError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for StorageError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<DrillError> for StorageError {
    fn from(err: DrillError) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Result type for artifact storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
