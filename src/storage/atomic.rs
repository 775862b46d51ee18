use crate::storage::{StorageError, StorageResult};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replaces `path` with `contents`
///
/// The content is written to a temporary file in the same directory, synced,
/// and renamed over the target. The directory is synced after the rename so
/// the new entry survives a power loss. A crash at any point leaves either
/// the old file or the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| StorageError::Replace {
        path: path.display().to_string(),
        source: e.error,
    })?;

    sync_dir(dir)
}

/// Flushes a directory entry change (create, rename) to disk
#[cfg(unix)]
fn sync_dir(dir: &Path) -> StorageResult<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

/// Directories cannot be opened for syncing here; the rename is left to the OS
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> StorageResult<()> {
    Ok(())
}
