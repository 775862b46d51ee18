//! Storage module for persisting crawl results
//!
//! This module handles everything written to disk by a crawl:
//! - The JSON result document, rewritten atomically on every append
//! - The session checkpoint used to resume an interrupted crawl
//! - The temp-file-then-rename writer both rely on

mod atomic;
mod json;
mod session;
mod traits;

pub use atomic::write_atomic;
pub use json::JsonStore;
pub use session::{session_path_for, PendingIndex, SessionState};
pub use traits::{ResultStore, StorageError, StorageResult};

use crate::CrawlError;
use std::path::Path;

/// Opens the result document for a crawl
///
/// # Arguments
///
/// * `path` - Path to the JSON result document
/// * `fresh` - Discard any existing records instead of resuming from them
///
/// # Returns
///
/// * `Ok(JsonStore)` - Store holding the records to resume from
/// * `Err(CrawlError)` - The document could not be read or replaced
pub fn open_store(path: &Path, fresh: bool) -> Result<JsonStore, CrawlError> {
    let store = if fresh {
        JsonStore::create(path)?
    } else {
        JsonStore::open(path)?
    };
    Ok(store)
}
