//! Error types for the query engine.

use std::time::Duration;

use thiserror::Error;

/// Failures the query engine can report.
///
/// Only [`Error::Timeout`] and [`Error::Store`] normally reach a user:
/// an empty corpus is recovered as an empty result set, and corruption of
/// the persisted index is recovered by a rebuild from the relational store.
#[derive(Error, Debug)]
pub enum Error {
    /// IDF weights were requested before any document was indexed.
    #[error("empty corpus: no documents have been indexed")]
    EmptyCorpus,

    /// The persisted vector index could not be decoded.
    #[error("index corruption: {0}")]
    IndexCorruption(String),

    /// The caller-imposed query budget ran out.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// The relational store failed.
    #[error("relational store error: {0:#}")]
    Store(anyhow::Error),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::IndexCorruption`] from anything displayable.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::IndexCorruption(msg.into())
    }
}

/// Result type alias for query engine operations.
pub type Result<T> = std::result::Result<T, Error>;
