//! File-backed stores for access grants and charge mappings.
//!
//! Each store keeps its whole document in memory behind a single
//! reader/writer lock and rewrites the backing file after every mutation:
//!
//! ```text
//! mutate in memory ──► serialize ──► temp file (same dir) ──► fsync ──► rename
//! ```
//!
//! The rename is the last step, so a reader of the file sees either the old
//! or the new snapshot, never a partial one.

mod access;
mod mapping;

pub use access::{AccessRecord, AccessStats, AccessStore, Grant};
pub use mapping::{ChargeMapping, ChargeMappingStore};

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::warn;

/// Read a JSON document, treating a missing or empty file as an empty store.
pub(crate) fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create data directory {}: {e}", dir.display());
        }
    }

    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };

    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(&data)
        .map_err(|e| Error::Serialization(format!("failed to parse {}: {e}", path.display())))
}

/// Replace `path` with the JSON encoding of `doc`.
pub(crate) fn write_atomic<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(doc)?;
    let persist_err = |source| Error::Persist {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
    tmp.write_all(&json).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}
