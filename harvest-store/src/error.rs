//! Store error types.

use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Endpoint not present in the metadata registry.
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    /// Stored state is malformed.
    #[error("Corrupt state in {path}: {reason}")]
    Corrupt {
        /// File holding the bad state.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Sink rejected a batch.
    #[error("Sink error: {0}")]
    Sink(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Sink(_))
    }

    /// Returns true if the error means the file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
