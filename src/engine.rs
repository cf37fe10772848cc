//! Application wiring: SQLite store, shared vector index, and router.
//!
//! [`Engine`] is what the CLI commands and the HTTP server share. It owns
//! the only writer path into the index (ingest and rebuild), persists the
//! index file after every write batch, and applies the configured time
//! budget around each query.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use receipt_query_core::error::Error;
use receipt_query_core::models::{NewReceipt, QueryResponse, QueryResult};
use receipt_query_core::router::QueryRouter;
use receipt_query_core::shared::SharedIndex;

use crate::config::Config;
use crate::db;
use crate::index_file::{self, LoadOutcome};
use crate::ingest;
use crate::sqlite_store::SqliteStore;

/// Counts reported after an ingest batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub receipts: usize,
    pub items: usize,
}

pub struct Engine {
    store: Arc<SqliteStore>,
    index: Arc<SharedIndex>,
    router: QueryRouter,
    index_path: PathBuf,
    timeout: Duration,
}

impl Engine {
    /// Connect to the database and load (or rebuild) the vector index.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store = Arc::new(SqliteStore::new(pool));

        let (index, outcome) = index_file::load_or_rebuild(&config.index.path, store.as_ref())
            .await
            .context("Failed to load vector index")?;
        if outcome == LoadOutcome::Recovered {
            info!("vector index recovered from relational store");
        }

        let index = Arc::new(SharedIndex::new(index));
        let router = QueryRouter::new(
            store.clone(),
            index.clone(),
            config.retrieval.router_params(),
        );

        Ok(Self {
            store,
            index,
            router,
            index_path: config.index.path.clone(),
            timeout: Duration::from_millis(config.retrieval.timeout_ms),
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn index_path(&self) -> &std::path::Path {
        &self.index_path
    }

    /// Answer one query within the configured time budget.
    pub async fn query(&self, text: &str, now: NaiveDate) -> receipt_query_core::Result<QueryResponse> {
        query_within(&self.router, self.timeout, text, now).await
    }

    /// Items most like the indexed item `item_id`.
    pub async fn similar(&self, item_id: i64) -> receipt_query_core::Result<Vec<QueryResult>> {
        match tokio::time::timeout(self.timeout, self.router.similar_items(item_id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    /// Insert receipts, index their items in one writer batch, and persist.
    ///
    /// The batch is all or nothing: every receipt is validated before the
    /// first insert and all rows go in under one transaction, so a failure
    /// leaves the database and the index as they were. If the index file
    /// cannot be written after the rows are committed, the stale file is
    /// removed so the next open rebuilds from the database.
    pub async fn ingest(&self, receipts: &[NewReceipt]) -> Result<IngestSummary> {
        for (i, receipt) in receipts.iter().enumerate() {
            ingest::validate(receipt).with_context(|| format!("receipt #{} is invalid", i + 1))?;
        }

        let docs = self
            .store
            .insert_receipts(receipts)
            .await
            .context("Failed to insert receipts")?;

        self.index.update(|index| {
            for doc in &docs {
                index.add(doc.item_id, &doc.text);
            }
            Ok(())
        })?;
        if let Err(e) = self.persist() {
            self.discard_index_file();
            return Err(e);
        }

        info!(receipts = receipts.len(), items = docs.len(), "ingest complete");
        Ok(IngestSummary {
            receipts: receipts.len(),
            items: docs.len(),
        })
    }

    /// Rebuild the whole index from the relational store and persist it.
    pub async fn rebuild(&self) -> Result<usize> {
        let index = index_file::rebuild(self.store.as_ref()).await?;
        let count = index.len();
        self.index.replace(index);
        self.persist()?;
        Ok(count)
    }

    /// Write the current snapshot to the index file.
    pub fn persist(&self) -> Result<()> {
        index_file::write(&self.index_path, &self.index.snapshot())
    }

    fn discard_index_file(&self) {
        match std::fs::remove_file(&self.index_path) {
            Ok(()) => warn!(
                path = %self.index_path.display(),
                "index file removed; it will be rebuilt on next start"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.index_path.display(),
                error = %e,
                "failed to remove stale index file"
            ),
        }
    }

    pub async fn close(self) {
        self.store.pool().close().await;
    }
}

/// Run one router query, giving up after `budget`.
///
/// A query that runs out of time returns [`Error::Timeout`] and no partial
/// results; the index is never written on this path.
pub async fn query_within(
    router: &QueryRouter,
    budget: Duration,
    text: &str,
    now: NaiveDate,
) -> receipt_query_core::Result<QueryResponse> {
    match tokio::time::timeout(budget, router.query(text, now)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(?budget, "query timed out");
            Err(Error::Timeout(budget))
        }
    }
}
