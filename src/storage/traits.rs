//! Storage traits and error types

use crate::storage::DatasetEntry;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Dataset index the crawler registers materialized resources with
///
/// The store owns record identity: `add` returns the id it assigned and
/// overwrites any record already stored under that id. Callers must not
/// depend on the id format.
pub trait IndexStore: Send + Sync {
    /// Adds or replaces a dataset, returning its id
    fn add(&self, entry: &DatasetEntry) -> StorageResult<String>;
}
