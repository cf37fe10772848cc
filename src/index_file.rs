//! Loading and persisting the vector index file.
//!
//! The index lives in a single binary file at `[index].path`. A missing
//! file means "never built"; an unreadable or corrupt file is logged and
//! replaced by a rebuild from the relational store. Writes go to a sibling
//! temp file first and are renamed into place, so a crash mid-write never
//! leaves a truncated index behind.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use receipt_query_core::index::VectorIndex;
use receipt_query_core::store::RecordStore;

/// How an index came to be in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Decoded from the persisted file.
    Loaded,
    /// Rebuilt because no file existed.
    BuiltFresh,
    /// Rebuilt because the file could not be decoded.
    Recovered,
}

/// Read the index file, if any.
///
/// Returns `Ok(None)` when the file does not exist. Decode failures are
/// returned as errors so the caller can decide to rebuild.
pub fn read(path: &Path) -> Result<Option<VectorIndex>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read index file: {}", path.display()))
        }
    };
    let index = VectorIndex::import(&bytes)
        .with_context(|| format!("Failed to decode index file: {}", path.display()))?;
    Ok(Some(index))
}

/// Write the index atomically.
pub fn write(path: &Path, index: &VectorIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    std::fs::write(&tmp, index.export())
        .with_context(|| format!("Failed to write index file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace index file: {}", path.display()))?;
    info!(path = %path.display(), vectors = index.len(), "index persisted");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Build a fresh index from every item the store knows.
pub async fn rebuild(store: &dyn RecordStore) -> Result<VectorIndex> {
    let corpus = store.corpus().await.context("Failed to read index corpus")?;
    let mut index = VectorIndex::new();
    index.rebuild(corpus.iter().map(|doc| (doc.item_id, doc.text.as_str())));
    info!(
        vectors = index.len(),
        terms = index.vocabulary().len(),
        "index rebuilt from relational store"
    );
    Ok(index)
}

/// Load the index from disk, rebuilding and persisting it when the file is
/// missing or corrupt. A failed rebuild is a hard error.
pub async fn load_or_rebuild(
    path: &Path,
    store: &dyn RecordStore,
) -> Result<(VectorIndex, LoadOutcome)> {
    let outcome = match read(path) {
        Ok(Some(index)) => return Ok((index, LoadOutcome::Loaded)),
        Ok(None) => LoadOutcome::BuiltFresh,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "index file unusable, rebuilding");
            LoadOutcome::Recovered
        }
    };
    let index = rebuild(store).await?;
    write(path, &index)?;
    Ok((index, outcome))
}
