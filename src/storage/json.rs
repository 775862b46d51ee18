//! JSON document result store
//!
//! Records are kept in memory and the whole document is atomically rewritten
//! on every append, so the file on disk is always a valid JSON array of
//! listing records.

use crate::state::ListingRecord;
use crate::storage::atomic::write_atomic;
use crate::storage::{ResultStore, StorageError, StorageResult};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Result store backed by a single JSON document
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    records: Vec<ListingRecord>,
    ids: HashSet<String>,
}

impl JsonStore {
    /// Opens the document at `path`, loading any records already stored
    ///
    /// A missing file yields an empty store. A file that does not parse as a
    /// record array is reported as [`StorageError::Corrupt`] and left untouched.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No result document at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("Result document {} is empty, starting empty", path.display());
            return Ok(Self::empty(path));
        }

        let loaded: Vec<ListingRecord> =
            serde_json::from_slice(&content).map_err(|source| StorageError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;

        let mut store = Self::empty(path);
        for record in loaded {
            if store.ids.insert(record.id.clone()) {
                store.records.push(record);
            } else {
                tracing::warn!("Dropping duplicate record {} from result document", record.id);
            }
        }

        tracing::info!(
            "Loaded {} records from {}",
            store.records.len(),
            store.path.display()
        );
        Ok(store)
    }

    /// Creates an empty store at `path`, replacing any existing document
    pub fn create(path: impl AsRef<Path>) -> StorageResult<Self> {
        let store = Self::empty(path.as_ref().to_path_buf());
        store.flush()?;
        Ok(store)
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            records: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Rewrites the whole document in compact form
    fn flush(&self) -> StorageResult<()> {
        let document = serde_json::to_vec(&self.records)?;
        write_atomic(&self.path, &document)
    }
}

impl ResultStore for JsonStore {
    fn append(&mut self, record: ListingRecord) -> StorageResult<bool> {
        if self.ids.contains(&record.id) {
            return Ok(false);
        }

        let id = record.id.clone();
        self.records.push(record);

        if let Err(e) = self.flush() {
            // Keep memory in line with what is on disk
            self.records.pop();
            return Err(e);
        }

        self.ids.insert(id);
        Ok(true)
    }

    fn snapshot(&self) -> Vec<ListingRecord> {
        self.records.clone()
    }

    fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
