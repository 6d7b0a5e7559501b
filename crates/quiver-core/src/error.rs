//! Error types for Quiver operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all Quiver crates. Uses `thiserror` for derive macros.
//!
//! The taxonomy separates transient failures (backend connectivity, embedding
//! provider hiccups, timeouts), which callers may retry, from permanent ones
//! (dimension mismatches, bad configuration), which they must not.

use thiserror::Error;

/// Errors that can occur in Quiver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A vector's length does not match its collection's fixed dimension.
    #[error("Dimension mismatch in collection '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Collection the write or query targeted.
        collection: String,
        /// The collection's fixed dimension.
        expected: usize,
        /// The offending vector length.
        actual: usize,
    },

    /// The storage engine could not be reached or rejected the request transiently.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The named collection does not exist.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// The embedding capability failed to produce vectors.
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// A per-module or per-call deadline elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Content not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic operation failure.
    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(collection: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            collection: collection.into(),
            expected,
            actual,
        }
    }

    /// Create a backend unavailable error.
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound(name.into())
    }

    /// Create an embedding provider error.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingProvider(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a generic operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create an I/O error annotated with the path involved.
    pub fn io_with_path(err: std::io::Error, path: &std::path::Path) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    }

    /// Whether a retry of the same request may succeed.
    ///
    /// Backend connectivity, embedding provider and timeout failures are
    /// transient; everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::EmbeddingProvider(_) | Self::Timeout(_)
        )
    }

    /// Whether this is a dimension mismatch.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }

    /// Whether this is a missing collection.
    pub fn is_collection_not_found(&self) -> bool {
        matches!(self, Self::CollectionNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Quiver's Error type.
pub type Result<T> = std::result::Result<T, Error>;
