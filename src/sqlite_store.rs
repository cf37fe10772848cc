//! SQLite-backed [`RecordStore`] implementation.
//!
//! Runs the parameterized queries produced by the SQL generator and serves
//! item lookups and the index corpus from the `receipts`/`items` schema.
//! Also owns the write side used by ingestion.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use receipt_query_core::models::{
    document_text, IndexDocument, ItemAttributes, NewReceipt, RelationalRow, StoreVisit,
};
use receipt_query_core::sql::{QueryShape, SqlQuery, SqlValue};
use receipt_query_core::store::{total_rows, RecordStore};

/// SQLite keeps the number of bound parameters per statement small.
const IDS_PER_STATEMENT: usize = 500;

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a receipt and its items in one transaction.
    ///
    /// Returns the index documents for the new items.
    pub async fn insert_receipt(&self, receipt: &NewReceipt) -> Result<Vec<IndexDocument>> {
        self.insert_receipts(std::slice::from_ref(receipt)).await
    }

    /// Insert a batch of receipts in one transaction: either every receipt
    /// is stored or none is.
    ///
    /// Returns the index documents for the new items, in insertion order.
    pub async fn insert_receipts(&self, receipts: &[NewReceipt]) -> Result<Vec<IndexDocument>> {
        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().timestamp();
        let mut docs = Vec::new();

        for (i, receipt) in receipts.iter().enumerate() {
            let receipt_id: i64 = sqlx::query(
                "INSERT INTO receipts (store_name, receipt_date, total_amount, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&receipt.store_name)
            .bind(receipt.receipt_date.format("%Y-%m-%d").to_string())
            .bind(receipt.total_amount())
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert receipt #{}", i + 1))?
            .last_insert_rowid();

            for item in &receipt.items {
                let item_id = sqlx::query(
                    "INSERT INTO items (receipt_id, item_name, quantity, unit_price, total_price) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(receipt_id)
                .bind(&item.item_name)
                .bind(item.quantity)
                .bind(item.unit_price())
                .bind(item.total_price)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!("failed to insert item '{}' of receipt #{}", item.item_name, i + 1)
                })?
                .last_insert_rowid();

                docs.push(IndexDocument {
                    item_id,
                    text: document_text(&item.item_name, &receipt.store_name),
                });
            }
        }

        tx.commit().await?;
        Ok(docs)
    }
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("invalid receipt_date in database: '{}'", text))
}

/// Columns: store_name, purchases, last_date, spent.
fn visit_from_row(row: &SqliteRow) -> Result<StoreVisit> {
    let date: String = row.try_get(2)?;
    Ok(StoreVisit {
        store_name: row.try_get(0)?,
        purchases: row.try_get(1)?,
        last_date: parse_date(&date)?,
        spent: row.try_get(3)?,
    })
}

/// Columns: id, item_name, quantity, unit_price, total_price, store_name, receipt_date.
fn item_from_row(row: &SqliteRow) -> Result<ItemAttributes> {
    let date: String = row.try_get(6)?;
    Ok(ItemAttributes {
        item_id: row.try_get(0)?,
        item_name: row.try_get(1)?,
        quantity: row.try_get(2)?,
        unit_price: row.try_get(3)?,
        total_price: row.try_get(4)?,
        store_name: row.try_get(5)?,
        receipt_date: parse_date(&date)?,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn fetch(&self, query: &SqlQuery) -> Result<Vec<RelationalRow>> {
        let mut q = sqlx::query(&query.sql);
        for value in &query.binds {
            q = match value {
                SqlValue::Text(text) => q.bind(text.as_str()),
                SqlValue::Real(real) => q.bind(*real),
                SqlValue::Integer(int) => q.bind(*int),
            };
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .context("relational query failed")?;

        match query.shape {
            QueryShape::Items => rows
                .iter()
                .map(|row| item_from_row(row).map(RelationalRow::Item))
                .collect(),
            QueryShape::Total => {
                let Some(row) = rows.first() else {
                    return Ok(Vec::new());
                };
                let total: f64 = row.try_get(0)?;
                let receipt_count: i64 = row.try_get(1)?;
                Ok(total_rows(total, receipt_count, query.filter.date_range))
            }
            QueryShape::Stores => rows
                .iter()
                .map(|row| visit_from_row(row).map(RelationalRow::Store))
                .collect(),
        }
    }

    async fn items_by_ids(&self, ids: &[i64]) -> Result<Vec<ItemAttributes>> {
        let mut items = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IDS_PER_STATEMENT) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT i.id, i.item_name, i.quantity, i.unit_price, i.total_price, \
                 r.store_name, r.receipt_date FROM items i JOIN receipts r ON r.id = i.receipt_id \
                 WHERE i.id IN ({placeholders})"
            );
            let mut q = sqlx::query(&sql);
            for id in chunk {
                q = q.bind(*id);
            }
            let rows = q.fetch_all(&self.pool).await?;
            for row in &rows {
                items.push(item_from_row(row)?);
            }
        }
        Ok(items)
    }

    async fn corpus(&self) -> Result<Vec<IndexDocument>> {
        let rows = sqlx::query(
            "SELECT i.id, i.item_name, r.store_name FROM items i \
             JOIN receipts r ON r.id = i.receipt_id ORDER BY i.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<IndexDocument> {
                let item_name: String = row.try_get("item_name")?;
                let store_name: String = row.try_get("store_name")?;
                Ok(IndexDocument {
                    item_id: row.try_get("id")?,
                    text: document_text(&item_name, &store_name),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use receipt_query_core::models::{DateRange, Intent, NewItem, Parameters};
    use receipt_query_core::sql::generate;

    async fn memory_store() -> SqliteStore {
        SqliteStore::new(db::memory_pool().await.unwrap())
    }

    async fn count(store: &SqliteStore, table: &str) -> i64 {
        sqlx::query(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.pool())
            .await
            .unwrap()
            .get(0)
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn receipt(store: &str, date: NaiveDate, items: &[(&str, f64)]) -> NewReceipt {
        NewReceipt {
            store_name: store.to_string(),
            receipt_date: date,
            total_amount: None,
            items: items
                .iter()
                .map(|(name, price)| NewItem {
                    item_name: name.to_string(),
                    quantity: 1.0,
                    unit_price: None,
                    total_price: *price,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_corpus() {
        let store = memory_store().await;
        let docs = store
            .insert_receipt(&receipt("Walmart", d(2024, 6, 10), &[("Organic Milk", 4.0)]))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "Organic Milk Walmart");

        let corpus = store.corpus().await.unwrap();
        assert_eq!(corpus, docs);
    }

    #[tokio::test]
    async fn test_fetch_items_and_totals() {
        let store = memory_store().await;
        store
            .insert_receipt(&receipt(
                "Walmart",
                d(2024, 6, 10),
                &[("Organic Milk", 4.0), ("Whole Wheat Bread", 3.0)],
            ))
            .await
            .unwrap();
        store
            .insert_receipt(&receipt("Trader Joe's", d(2024, 6, 12), &[("Greek Yogurt", 6.0)]))
            .await
            .unwrap();

        let params = Parameters {
            store: Some("trader".into()),
            ..Default::default()
        };
        let q = generate(Intent::StoreQuery, &params, 10).unwrap();
        let rows = store.fetch(&q).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(matches!(&rows[0], RelationalRow::Item(i) if i.item_name == "Greek Yogurt"));

        let params = Parameters {
            date_range: Some(DateRange::new(d(2024, 6, 1), d(2024, 6, 30))),
            ..Default::default()
        };
        let q = generate(Intent::SpendingAnalysis, &params, 10).unwrap();
        let rows = store.fetch(&q).await.unwrap();
        assert!(matches!(&rows[..], [RelationalRow::Total(t)] if t.total == 13.0 && t.receipt_count == 2));

        let params = Parameters {
            date_range: Some(DateRange::day(d(2018, 1, 1))),
            ..Default::default()
        };
        let q = generate(Intent::SpendingAnalysis, &params, 10).unwrap();
        assert!(store.fetch(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_insert_is_all_or_nothing() {
        let store = memory_store().await;
        sqlx::query(
            "CREATE TRIGGER reject_broken BEFORE INSERT ON receipts \
             WHEN NEW.store_name = 'Broken' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let batch = vec![
            receipt("Walmart", d(2024, 6, 10), &[("Organic Milk", 4.0)]),
            receipt("Broken", d(2024, 6, 11), &[("Eggs", 3.0)]),
        ];
        let err = store.insert_receipts(&batch).await.unwrap_err();
        assert!(format!("{err:#}").contains("receipt #2"));
        assert_eq!(count(&store, "receipts").await, 0);
        assert_eq!(count(&store, "items").await, 0);

        let docs = store.insert_receipts(&batch[..1]).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(count(&store, "receipts").await, 1);
    }

    #[tokio::test]
    async fn test_fetch_stores_for_item() {
        let store = memory_store().await;
        store
            .insert_receipts(&[
                receipt("Walmart", d(2024, 6, 10), &[("White Bread", 2.0), ("Milk", 4.0)]),
                receipt("Aldi", d(2024, 6, 12), &[("Rye Bread", 3.0)]),
                receipt("Walmart", d(2024, 6, 14), &[("Bread Rolls", 1.5)]),
            ])
            .await
            .unwrap();

        let params = Parameters {
            item_name: Some("bread".into()),
            ..Default::default()
        };
        let q = generate(Intent::StoreQuery, &params, 10).unwrap();
        let rows = store.fetch(&q).await.unwrap();
        let visits: Vec<&StoreVisit> = rows
            .iter()
            .map(|r| match r {
                RelationalRow::Store(v) => v,
                other => panic!("unexpected row {other:?}"),
            })
            .collect();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[0].store_name, "Walmart");
        assert_eq!(visits[0].purchases, 2);
        assert_eq!(visits[0].last_date, d(2024, 6, 14));
        assert_eq!(visits[0].spent, 3.5);
        assert_eq!(visits[1].store_name, "Aldi");
    }

    #[tokio::test]
    async fn test_like_wildcards_are_literal() {
        let store = memory_store().await;
        store
            .insert_receipt(&receipt("Shop", d(2024, 1, 1), &[("Milk", 1.0)]))
            .await
            .unwrap();
        let params = Parameters {
            item_name: Some("%".into()),
            ..Default::default()
        };
        let q = generate(Intent::ItemSearch, &params, 10).unwrap();
        assert!(store.fetch(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_items_by_ids_skips_unknown() {
        let store = memory_store().await;
        let docs = store
            .insert_receipt(&receipt("Costco", d(2024, 2, 2), &[("Eggs", 5.0), ("Rice", 9.0)]))
            .await
            .unwrap();
        let items = store
            .items_by_ids(&[docs[1].item_id, 9999])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_name, "Rice");
        assert_eq!(items[0].receipt_date, d(2024, 2, 2));
    }
}
