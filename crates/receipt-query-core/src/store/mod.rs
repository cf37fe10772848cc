//! Relational store abstraction.
//!
//! The [`RecordStore`] trait is everything the query router needs from the
//! relational side: run a generated [`SqlQuery`], look up item attributes for
//! vector hits, and list the corpus the vector index is built from.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. The
//! application crate backs it with SQLite; [`memory::InMemoryRecordStore`]
//! evaluates the query's [`ItemFilter`](crate::sql::ItemFilter) directly.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DateRange, IndexDocument, ItemAttributes, RelationalRow, SpendingTotal};
use crate::sql::SqlQuery;

/// Read-only access to receipts and items.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`fetch`](RecordStore::fetch) | Run a generated query |
/// | [`items_by_ids`](RecordStore::items_by_ids) | Attributes for vector hits |
/// | [`corpus`](RecordStore::corpus) | Every item's indexable text |
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run `query` and return its rows.
    ///
    /// Aggregations over zero receipts return no rows.
    async fn fetch(&self, query: &SqlQuery) -> Result<Vec<RelationalRow>>;

    /// Attributes for the given item ids. Unknown ids are skipped; order is
    /// unspecified.
    async fn items_by_ids(&self, ids: &[i64]) -> Result<Vec<ItemAttributes>>;

    /// `(item_id, document text)` for every item, in ascending id order.
    async fn corpus(&self) -> Result<Vec<IndexDocument>>;
}

/// Rows for an aggregation result.
pub fn total_rows(total: f64, receipt_count: i64, date_range: Option<DateRange>) -> Vec<RelationalRow> {
    if receipt_count == 0 {
        return Vec::new();
    }
    vec![RelationalRow::Total(SpendingTotal {
        total,
        receipt_count,
        date_range,
    })]
}
