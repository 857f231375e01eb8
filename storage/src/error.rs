//! Error types for the storage layer.

use thiserror::Error;

/// Errors returned by storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The requested key is not present.
    #[error("not found")]
    NotFound,

    /// The database has been closed.
    #[error("database closed")]
    Closed,

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Convenience result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
