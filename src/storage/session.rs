//! Crawl session checkpoint
//!
//! The minimal state needed to resume an interrupted crawl, persisted next to
//! the result document. Records already stored are not repeated here; the
//! seen set is rebuilt from the result document itself.

use crate::state::ListingRef;
use crate::storage::atomic::write_atomic;
use crate::storage::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use url::Url;

/// An index page that was queued or in flight when the checkpoint was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIndex {
    pub url: Url,
    pub page_number: u32,
}

/// Resumable crawl state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Hash of the configuration the session was started with
    #[serde(default)]
    pub config_hash: Option<String>,

    /// Highest index page number fully processed
    pub last_index_page: u32,

    /// Index pages still to fetch
    #[serde(default)]
    pub pending_index_pages: Vec<PendingIndex>,

    /// Discovered listings whose detail page has not been stored yet
    #[serde(default)]
    pub pending_details: Vec<ListingRef>,

    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(config_hash: Option<String>) -> Self {
        Self {
            config_hash,
            last_index_page: 0,
            pending_index_pages: Vec::new(),
            pending_details: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Returns true if nothing is left to resume
    pub fn is_exhausted(&self) -> bool {
        self.pending_index_pages.is_empty() && self.pending_details.is_empty()
    }

    /// Loads a checkpoint, returning `None` if there is none
    pub fn load(path: &Path) -> StorageResult<Option<Self>> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                path: path.display().to_string(),
                source,
            })
    }

    /// Atomically writes the checkpoint
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        let document = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &document)
    }

    /// Removes a checkpoint once the crawl it describes has finished
    pub fn clear(path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Returns the checkpoint path belonging to a result document
///
/// # Examples
///
/// ```
/// use listing_harvester::storage::session_path_for;
/// use std::path::Path;
///
/// let path = session_path_for(Path::new("data/results.json"));
/// assert_eq!(path, Path::new("data/results.json.session.json"));
/// ```
pub fn session_path_for(results_path: &Path) -> PathBuf {
    let mut name = results_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".session.json");
    results_path.with_file_name(name)
}
