//! Result store trait and error types

use thiserror::Error;

/// Errors that can occur while persisting output
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Failed to move {path} into place: {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Committed per-target output, keyed by the target's slug
///
/// Existence of a committed entry is the "already crawled" marker, so
/// `commit` must make an entry visible all at once or not at all.
/// Two workers committing the same key is allowed; the last write wins.
pub trait ResultStore: Send + Sync {
    /// Returns true if output for `key` has been committed
    fn contains(&self, key: &str) -> bool;

    /// Atomically writes the output for `key`
    fn commit(&self, key: &str, bytes: &[u8]) -> StorageResult<()>;
}
