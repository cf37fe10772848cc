//! SQL template generation.
//!
//! Every query is assembled from constant fragments and `?` placeholders.
//! Values taken from the user's text only ever travel in
//! [`SqlQuery::binds`]. Alongside the SQL, each [`SqlQuery`] carries the
//! [`ItemFilter`] it encodes so stores that cannot run SQL (the in-memory
//! test store) can apply the same predicate.
//!
//! Schema:
//!
//! ```text
//! receipts(id, store_name, receipt_date, total_amount)
//! items(id, receipt_id, item_name, quantity, unit_price, total_price)
//! ```

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{AmountPredicate, Comparison, DateRange, Intent, Parameters};

/// A bind value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Text(String),
    Real(f64),
    Integer(i64),
}

/// What the rows of a query look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryShape {
    /// Columns: id, item_name, quantity, unit_price, total_price, store_name, receipt_date.
    Items,
    /// Columns: total, receipt_count.
    Total,
    /// Columns: store_name, purchases, last_date, spent. One row per store.
    Stores,
}

/// Structured form of the WHERE clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemFilter {
    /// Lower-cased words that must all appear in the item name.
    pub item_words: Vec<String>,
    /// Lower-cased substring of the store name.
    pub store: Option<String>,
    pub date_range: Option<DateRange>,
    pub amount: Option<AmountPredicate>,
}

impl ItemFilter {
    pub fn from_parameters(params: &Parameters) -> Self {
        Self {
            item_words: params
                .item_name
                .as_deref()
                .map(|name| name.split_whitespace().map(str::to_lowercase).collect())
                .unwrap_or_default(),
            store: params.store.as_deref().map(str::to_lowercase),
            date_range: params.date_range,
            amount: params.amount,
        }
    }

    pub fn matches_item_name(&self, item_name: &str) -> bool {
        let name = item_name.to_lowercase();
        self.item_words.iter().all(|w| name.contains(w.as_str()))
    }

    pub fn matches_receipt(&self, store_name: &str, receipt_date: NaiveDate) -> bool {
        let store_ok = self
            .store
            .as_deref()
            .map_or(true, |s| store_name.to_lowercase().contains(s));
        let date_ok = self.date_range.map_or(true, |r| r.contains(receipt_date));
        store_ok && date_ok
    }

    pub fn matches_amount(&self, amount: f64) -> bool {
        self.amount.map_or(true, |a| a.op.matches(amount, a.value))
    }
}

/// A parameterized query plus everything needed to interpret its rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlQuery {
    pub sql: String,
    pub binds: Vec<SqlValue>,
    pub shape: QueryShape,
    pub filter: ItemFilter,
    /// Row limit for item queries.
    pub limit: Option<usize>,
}

const ITEM_COLUMNS: &str = "SELECT i.id, i.item_name, i.quantity, i.unit_price, i.total_price, \
     r.store_name, r.receipt_date FROM items i JOIN receipts r ON r.id = i.receipt_id";
const ITEM_TOTAL: &str = "SELECT COALESCE(SUM(i.total_price), 0.0), COUNT(DISTINCT r.id) \
     FROM items i JOIN receipts r ON r.id = i.receipt_id";
const RECEIPT_TOTAL: &str =
    "SELECT COALESCE(SUM(r.total_amount), 0.0), COUNT(*) FROM receipts r";
const STORE_VISITS: &str = "SELECT r.store_name, COUNT(i.id), MAX(r.receipt_date), \
     COALESCE(SUM(i.total_price), 0.0) FROM items i JOIN receipts r ON r.id = i.receipt_id";
const ITEM_ORDER: &str = " ORDER BY r.receipt_date DESC, i.id ASC LIMIT ?";
const STORE_ORDER: &str =
    " GROUP BY r.store_name ORDER BY MAX(r.receipt_date) DESC, r.store_name ASC LIMIT ?";

const ITEM_NAME_CLAUSE: &str = "LOWER(i.item_name) LIKE ? ESCAPE '\\'";
const STORE_CLAUSE: &str = "LOWER(r.store_name) LIKE ? ESCAPE '\\'";
const DATE_CLAUSE: &str = "r.receipt_date BETWEEN ? AND ?";

fn amount_clause(column: AmountColumn, op: Comparison) -> &'static str {
    use AmountColumn::*;
    use Comparison::*;
    match (column, op) {
        (ItemPrice, GreaterThan) => "i.total_price > ?",
        (ItemPrice, LessThan) => "i.total_price < ?",
        (ItemPrice, AtLeast) => "i.total_price >= ?",
        (ItemPrice, AtMost) => "i.total_price <= ?",
        (ReceiptTotal, GreaterThan) => "r.total_amount > ?",
        (ReceiptTotal, LessThan) => "r.total_amount < ?",
        (ReceiptTotal, AtLeast) => "r.total_amount >= ?",
        (ReceiptTotal, AtMost) => "r.total_amount <= ?",
    }
}

#[derive(Clone, Copy)]
enum AmountColumn {
    ItemPrice,
    ReceiptTotal,
}

/// Build the query for `intent`, or `None` for intents answered without SQL.
///
/// `limit` caps item and store rows; it does not apply to totals.
///
/// A store question that names an item but no store ("where did I buy
/// bread") lists the stores that sold it instead of the items.
pub fn generate(intent: Intent, params: &Parameters, limit: usize) -> Option<SqlQuery> {
    let filter = ItemFilter::from_parameters(params);
    match intent {
        Intent::SpendingAnalysis => Some(total_query(filter)),
        Intent::StoreQuery if !filter.item_words.is_empty() && filter.store.is_none() => {
            Some(stores_query(filter, limit))
        }
        Intent::ItemSearch | Intent::StoreQuery | Intent::ListItems => {
            Some(items_query(filter, limit))
        }
        Intent::SemanticSearch | Intent::Unknown => None,
    }
}

fn items_query(filter: ItemFilter, limit: usize) -> SqlQuery {
    let mut w = WhereBuilder::default();
    w.item_words(&filter.item_words);
    w.store(filter.store.as_deref());
    w.date(filter.date_range);
    w.amount(filter.amount, AmountColumn::ItemPrice);
    w.binds.push(SqlValue::Integer(limit as i64));

    SqlQuery {
        sql: format!("{ITEM_COLUMNS}{}{ITEM_ORDER}", w.where_sql()),
        binds: w.binds,
        shape: QueryShape::Items,
        filter,
        limit: Some(limit),
    }
}

fn stores_query(filter: ItemFilter, limit: usize) -> SqlQuery {
    let mut w = WhereBuilder::default();
    w.item_words(&filter.item_words);
    w.date(filter.date_range);
    w.amount(filter.amount, AmountColumn::ItemPrice);
    w.binds.push(SqlValue::Integer(limit as i64));

    SqlQuery {
        sql: format!("{STORE_VISITS}{}{STORE_ORDER}", w.where_sql()),
        binds: w.binds,
        shape: QueryShape::Stores,
        filter,
        limit: Some(limit),
    }
}

/// Receipt totals, or item totals when an item name narrows the question.
fn total_query(filter: ItemFilter) -> SqlQuery {
    let mut w = WhereBuilder::default();
    let base = if filter.item_words.is_empty() {
        w.store(filter.store.as_deref());
        w.date(filter.date_range);
        w.amount(filter.amount, AmountColumn::ReceiptTotal);
        RECEIPT_TOTAL
    } else {
        w.item_words(&filter.item_words);
        w.store(filter.store.as_deref());
        w.date(filter.date_range);
        w.amount(filter.amount, AmountColumn::ItemPrice);
        ITEM_TOTAL
    };

    SqlQuery {
        sql: format!("{base}{}", w.where_sql()),
        binds: w.binds,
        shape: QueryShape::Total,
        filter,
        limit: None,
    }
}

#[derive(Default)]
struct WhereBuilder {
    clauses: Vec<&'static str>,
    binds: Vec<SqlValue>,
}

impl WhereBuilder {
    fn item_words(&mut self, words: &[String]) {
        for word in words {
            self.clauses.push(ITEM_NAME_CLAUSE);
            self.binds.push(SqlValue::Text(like_pattern(word)));
        }
    }

    fn store(&mut self, store: Option<&str>) {
        if let Some(store) = store {
            self.clauses.push(STORE_CLAUSE);
            self.binds.push(SqlValue::Text(like_pattern(store)));
        }
    }

    fn date(&mut self, range: Option<DateRange>) {
        if let Some(range) = range {
            self.clauses.push(DATE_CLAUSE);
            self.binds.push(SqlValue::Text(range.start.format("%Y-%m-%d").to_string()));
            self.binds.push(SqlValue::Text(range.end.format("%Y-%m-%d").to_string()));
        }
    }

    fn amount(&mut self, amount: Option<AmountPredicate>, column: AmountColumn) {
        if let Some(amount) = amount {
            self.clauses.push(amount_clause(column, amount.op));
            self.binds.push(SqlValue::Real(amount.value));
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// `%text%` with LIKE metacharacters escaped by `\`.
pub fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
