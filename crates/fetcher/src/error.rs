//! Error types for the fetcher system
//!
//! Configuration mistakes and unresolved sources are fatal at the call site.
//! Errors raised by a [`DataSource`](crate::source::DataSource) travel through
//! the stages unchanged.

use thiserror::Error;

/// Result type alias for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Error types for fetch operations
#[derive(Debug, Error)]
pub enum FetchError {
    /// Invalid cast/derivative/aggregate wiring or an unsupported operation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A schema, table or source could not be resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure reported by a data source implementation
    #[error("Data source error: {0}")]
    Source(String),

    /// A record could not be cast into the requested model type
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FetchError {
    pub fn configuration(message: impl Into<String>) -> Self {
        FetchError::Configuration(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        FetchError::NotFound(message.into())
    }

    pub fn source(message: impl Into<String>) -> Self {
        FetchError::Source(message.into())
    }

    /// Returns true for errors caused by how a stage was wired
    pub fn is_configuration(&self) -> bool {
        matches!(self, FetchError::Configuration(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}
