//! Error types for the core module.

use super::storage::StorageError;

/// Core error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Session or memory storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
