//! Storage traits and error types
//!
//! This module defines the trait interface for result stores and the
//! associated error type.

use crate::state::ListingRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Any of these aborts the crawl: once a write fails, the result document
/// can no longer be trusted to reflect the crawl's progress.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt document at {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to replace {path}: {source}")]
    Replace {
        path: String,
        source: std::io::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for result store implementations
///
/// A store owns every record handed to it. Implementations must make each
/// `append` durable before returning: after a crash the persisted state
/// either contains the record or equals the state before the call.
pub trait ResultStore: Send {
    /// Durably adds a record
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The record was stored
    /// * `Ok(false)` - A record with the same id already exists; nothing changed
    /// * `Err(StorageError)` - The write failed and the store is unchanged
    fn append(&mut self, record: ListingRecord) -> StorageResult<bool>;

    /// Returns all records currently stored, in insertion order
    fn snapshot(&self) -> Vec<ListingRecord>;

    /// Returns whether a record with this id is stored
    fn contains_id(&self, id: &str) -> bool;

    /// Returns the number of stored records
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
