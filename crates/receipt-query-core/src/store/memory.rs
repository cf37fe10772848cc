//! In-memory [`RecordStore`] implementation for tests.
//!
//! Receipts live in a `Vec` behind a `parking_lot::RwLock`. Queries are
//! answered by evaluating the structured [`ItemFilter`] carried by each
//! [`SqlQuery`], with the same ordering and limits the SQL encodes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::models::{
    document_text, IndexDocument, ItemAttributes, NewReceipt, RelationalRow, StoreVisit,
};
use crate::sql::{ItemFilter, QueryShape, SqlQuery};

use super::{total_rows, RecordStore};

struct StoredReceipt {
    id: i64,
    store_name: String,
    receipt_date: NaiveDate,
    total_amount: f64,
    items: Vec<StoredItem>,
}

struct StoredItem {
    id: i64,
    item_name: String,
    quantity: f64,
    unit_price: f64,
    total_price: f64,
}

#[derive(Default)]
struct Tables {
    receipts: Vec<StoredReceipt>,
    next_receipt_id: i64,
    next_item_id: i64,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a receipt, returning the ids assigned to its items in order.
    /// Ids start at 1, like SQLite rowids.
    pub fn insert_receipt(&self, receipt: &NewReceipt) -> Vec<i64> {
        let mut tables = self.tables.write();
        tables.next_receipt_id += 1;
        let receipt_id = tables.next_receipt_id;

        let mut items = Vec::with_capacity(receipt.items.len());
        for item in &receipt.items {
            tables.next_item_id += 1;
            items.push(StoredItem {
                id: tables.next_item_id,
                item_name: item.item_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price(),
                total_price: item.total_price,
            });
        }
        let ids = items.iter().map(|i| i.id).collect();

        tables.receipts.push(StoredReceipt {
            id: receipt_id,
            store_name: receipt.store_name.clone(),
            receipt_date: receipt.receipt_date,
            total_amount: receipt.total_amount(),
            items,
        });
        ids
    }

    /// Delete an item, leaving its receipt in place.
    pub fn delete_item(&self, item_id: i64) -> bool {
        let mut tables = self.tables.write();
        for receipt in &mut tables.receipts {
            if let Some(pos) = receipt.items.iter().position(|i| i.id == item_id) {
                receipt.items.remove(pos);
                return true;
            }
        }
        false
    }

    /// Make every call fail, simulating a lost connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("record store unavailable");
        }
        Ok(())
    }
}

fn matching_items<'a>(
    tables: &'a Tables,
    filter: &'a ItemFilter,
) -> impl Iterator<Item = (&'a StoredReceipt, &'a StoredItem)> + 'a {
    tables
        .receipts
        .iter()
        .filter(move |r| filter.matches_receipt(&r.store_name, r.receipt_date))
        .flat_map(|r| r.items.iter().map(move |i| (r, i)))
        .filter(move |(_, i)| {
            filter.matches_item_name(&i.item_name) && filter.matches_amount(i.total_price)
        })
}

fn attributes(receipt: &StoredReceipt, item: &StoredItem) -> ItemAttributes {
    ItemAttributes {
        item_id: item.id,
        item_name: item.item_name.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
        total_price: item.total_price,
        store_name: receipt.store_name.clone(),
        receipt_date: receipt.receipt_date,
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch(&self, query: &SqlQuery) -> Result<Vec<RelationalRow>> {
        self.check_available()?;
        let tables = self.tables.read();
        let filter = &query.filter;

        match query.shape {
            QueryShape::Items => {
                let mut rows: Vec<ItemAttributes> = matching_items(&tables, filter)
                    .map(|(r, i)| attributes(r, i))
                    .collect();
                rows.sort_by(|a, b| {
                    b.receipt_date
                        .cmp(&a.receipt_date)
                        .then(a.item_id.cmp(&b.item_id))
                });
                rows.truncate(query.limit.unwrap_or(usize::MAX));
                Ok(rows.into_iter().map(RelationalRow::Item).collect())
            }
            QueryShape::Total if filter.item_words.is_empty() => {
                let matching: Vec<&StoredReceipt> = tables
                    .receipts
                    .iter()
                    .filter(|r| filter.matches_receipt(&r.store_name, r.receipt_date))
                    .filter(|r| filter.matches_amount(r.total_amount))
                    .collect();
                let total = matching.iter().map(|r| r.total_amount).sum();
                Ok(total_rows(total, matching.len() as i64, filter.date_range))
            }
            QueryShape::Total => {
                let mut receipts = HashSet::new();
                let mut total = 0.0;
                for (r, i) in matching_items(&tables, filter) {
                    receipts.insert(r.id);
                    total += i.total_price;
                }
                Ok(total_rows(total, receipts.len() as i64, filter.date_range))
            }
            QueryShape::Stores => {
                let mut visits: HashMap<&str, StoreVisit> = HashMap::new();
                for (r, i) in matching_items(&tables, filter) {
                    let visit = visits.entry(r.store_name.as_str()).or_insert_with(|| StoreVisit {
                        store_name: r.store_name.clone(),
                        purchases: 0,
                        last_date: r.receipt_date,
                        spent: 0.0,
                    });
                    visit.purchases += 1;
                    visit.last_date = visit.last_date.max(r.receipt_date);
                    visit.spent += i.total_price;
                }
                let mut rows: Vec<StoreVisit> = visits.into_values().collect();
                rows.sort_by(|a, b| {
                    b.last_date
                        .cmp(&a.last_date)
                        .then_with(|| a.store_name.cmp(&b.store_name))
                });
                rows.truncate(query.limit.unwrap_or(usize::MAX));
                Ok(rows.into_iter().map(RelationalRow::Store).collect())
            }
        }
    }

    async fn items_by_ids(&self, ids: &[i64]) -> Result<Vec<ItemAttributes>> {
        self.check_available()?;
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        let tables = self.tables.read();
        Ok(tables
            .receipts
            .iter()
            .flat_map(|r| r.items.iter().map(move |i| (r, i)))
            .filter(|(_, i)| wanted.contains(&i.id))
            .map(|(r, i)| attributes(r, i))
            .collect())
    }

    async fn corpus(&self) -> Result<Vec<IndexDocument>> {
        self.check_available()?;
        let tables = self.tables.read();
        let mut docs: Vec<IndexDocument> = tables
            .receipts
            .iter()
            .flat_map(|r| {
                r.items.iter().map(move |i| IndexDocument {
                    item_id: i.id,
                    text: document_text(&i.item_name, &r.store_name),
                })
            })
            .collect();
        docs.sort_by_key(|d| d.item_id);
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, Intent, NewItem, Parameters};
    use crate::sql::generate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn item(name: &str, price: f64) -> NewItem {
        NewItem {
            item_name: name.to_string(),
            quantity: 1.0,
            unit_price: None,
            total_price: price,
        }
    }

    fn seeded() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.insert_receipt(&NewReceipt {
            store_name: "Walmart".into(),
            receipt_date: d(2024, 6, 10),
            total_amount: None,
            items: vec![item("Organic Milk", 4.0), item("Whole Wheat Bread", 3.0)],
        });
        store.insert_receipt(&NewReceipt {
            store_name: "Trader Joe's".into(),
            receipt_date: d(2024, 6, 12),
            total_amount: Some(20.0),
            items: vec![item("Greek Yogurt", 6.0)],
        });
        store
    }

    #[tokio::test]
    async fn test_items_newest_first() {
        let store = seeded();
        let q = generate(Intent::ListItems, &Parameters::default(), 10).unwrap();
        let rows = store.fetch(&q).await.unwrap();
        let names: Vec<_> = rows
            .iter()
            .map(|r| match r {
                RelationalRow::Item(i) => i.item_name.as_str(),
                other => panic!("unexpected row {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["Greek Yogurt", "Organic Milk", "Whole Wheat Bread"]);
    }

    #[tokio::test]
    async fn test_items_limit() {
        let store = seeded();
        let q = generate(Intent::ListItems, &Parameters::default(), 1).unwrap();
        assert_eq!(store.fetch(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_receipt_total() {
        let store = seeded();
        let params = Parameters {
            date_range: Some(DateRange::new(d(2024, 6, 1), d(2024, 6, 30))),
            ..Default::default()
        };
        let q = generate(Intent::SpendingAnalysis, &params, 10).unwrap();
        let rows = store.fetch(&q).await.unwrap();
        match &rows[..] {
            [RelationalRow::Total(t)] => {
                assert_eq!(t.total, 27.0);
                assert_eq!(t.receipt_count, 2);
            }
            other => panic!("unexpected rows {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_item_total() {
        let store = seeded();
        let params = Parameters {
            item_name: Some("milk".into()),
            ..Default::default()
        };
        let q = generate(Intent::SpendingAnalysis, &params, 10).unwrap();
        let rows = store.fetch(&q).await.unwrap();
        assert!(matches!(&rows[..], [RelationalRow::Total(t)] if t.total == 4.0 && t.receipt_count == 1));
    }

    #[tokio::test]
    async fn test_total_over_nothing_is_empty() {
        let store = seeded();
        let params = Parameters {
            date_range: Some(DateRange::day(d(2018, 1, 1))),
            ..Default::default()
        };
        let q = generate(Intent::SpendingAnalysis, &params, 10).unwrap();
        assert!(store.fetch(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stores_grouped_newest_first() {
        let store = seeded();
        store.insert_receipt(&NewReceipt {
            store_name: "Walmart".into(),
            receipt_date: d(2024, 6, 14),
            total_amount: None,
            items: vec![item("Sourdough Bread", 5.0)],
        });
        store.insert_receipt(&NewReceipt {
            store_name: "Aldi".into(),
            receipt_date: d(2024, 6, 11),
            total_amount: None,
            items: vec![item("Rye Bread", 2.5), item("Bananas", 1.0)],
        });
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
        assert_eq!(visits[0].spent, 8.0);
        assert_eq!(visits[1].store_name, "Aldi");
        assert_eq!(visits[1].purchases, 1);
    }

    #[tokio::test]
    async fn test_items_by_ids_skips_unknown() {
        let store = seeded();
        let rows = store.items_by_ids(&[3, 99]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item_name, "Greek Yogurt");
        assert_eq!(rows[0].store_name, "Trader Joe's");
    }

    #[tokio::test]
    async fn test_corpus_text() {
        let store = seeded();
        assert!(store.delete_item(2));
        let corpus = store.corpus().await.unwrap();
        let texts: Vec<_> = corpus.iter().map(|d| (d.item_id, d.text.as_str())).collect();
        assert_eq!(
            texts,
            vec![(1, "Organic Milk Walmart"), (3, "Greek Yogurt Trader Joe's")]
        );
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = seeded();
        store.set_unavailable(true);
        assert!(store.corpus().await.is_err());
        store.set_unavailable(false);
        assert!(store.corpus().await.is_ok());
    }
}
