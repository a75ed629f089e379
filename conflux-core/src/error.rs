//! Error types for drill operations.

use thiserror::Error;

/// Errors raised while validating plugins or running a drill.
#[derive(Error, Debug)]
pub enum DrillError {
    /// Invalid option combination or mismatched inputs (fatal before work begins).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed plugin descriptor; lists every missing member.
    #[error("Plugin validation failed, missing: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    /// The catalog has no scene (or no required band) for the request.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Clipping produced a geometry the direction classifier cannot explain.
    #[error("Geometry invariant violated: {0}")]
    GeometryInvariantViolation(String),

    /// An expected band or key was missing from scene data.
    #[error("Missing band or key: {0}")]
    MissingBand(String),

    /// Scene data had an unexpected type or shape.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Reading imagery from storage failed.
    #[error("Raster I/O error: {0}")]
    RasterIo(String),

    /// A plugin emitted a warning during transform or summarise.
    #[error("Plugin warning promoted to error: {0}")]
    PluginWarning(String),

    /// A plugin callback failed for another reason.
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Catalog failure outside the classified kinds.
    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl DrillError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::GeometryInvariantViolation(msg.into())
    }

    pub fn missing_band(msg: impl Into<String>) -> Self {
        Self::MissingBand(msg.into())
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    pub fn raster_io(msg: impl Into<String>) -> Self {
        Self::RasterIo(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Whether a queue worker may dead-letter this failure and carry on.
    ///
    /// Anything not listed here stops the worker.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DrillError::MissingBand(_)
                | DrillError::TypeMismatch(_)
                | DrillError::RasterIo(_)
                | DrillError::DataUnavailable(_)
        )
    }
}

/// Result type for drill operations.
pub type Result<T> = std::result::Result<T, DrillError>;
