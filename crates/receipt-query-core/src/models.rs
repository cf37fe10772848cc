//! Core data types: intents, extracted parameters, and query results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Coarse category of what a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ItemSearch,
    SpendingAnalysis,
    StoreQuery,
    SemanticSearch,
    ListItems,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ItemSearch => "item_search",
            Intent::SpendingAnalysis => "spending_analysis",
            Intent::StoreQuery => "store_query",
            Intent::SemanticSearch => "semantic_search",
            Intent::ListItems => "list_items",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, swapping the bounds if they are reversed.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Comparison operator of an [`AmountPredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    GreaterThan,
    LessThan,
    AtLeast,
    AtMost,
}

impl Comparison {
    /// SQL operator text. Always one of four constants.
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Comparison::GreaterThan => ">",
            Comparison::LessThan => "<",
            Comparison::AtLeast => ">=",
            Comparison::AtMost => "<=",
        }
    }

    pub fn matches(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::GreaterThan => lhs > rhs,
            Comparison::LessThan => lhs < rhs,
            Comparison::AtLeast => lhs >= rhs,
            Comparison::AtMost => lhs <= rhs,
        }
    }
}

/// "over $20" → `amount > 20.00`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountPredicate {
    pub op: Comparison,
    pub value: f64,
}

/// Structured filters pulled out of query text. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub date_range: Option<DateRange>,
    pub store: Option<String>,
    pub item_name: Option<String>,
    pub amount: Option<AmountPredicate>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none()
            && self.store.is_none()
            && self.item_name.is_none()
            && self.amount.is_none()
    }
}

/// Which answering strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Vector,
    Relational,
}

impl std::fmt::Display for ResultSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResultSource::Vector => "vector",
            ResultSource::Relational => "relational",
        })
    }
}

/// Display attributes of one purchased item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub item_id: i64,
    pub item_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    pub store_name: String,
    pub receipt_date: NaiveDate,
}

/// Result of a spending aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingTotal {
    pub total: f64,
    pub receipt_count: i64,
    /// Date filter the total was computed over, if any.
    pub date_range: Option<DateRange>,
}

/// A store where matching items were bought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreVisit {
    pub store_name: String,
    /// Matching items bought there.
    pub purchases: i64,
    pub last_date: NaiveDate,
    pub spent: f64,
}

/// One row returned by the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationalRow {
    Item(ItemAttributes),
    Total(SpendingTotal),
    Store(StoreVisit),
}

/// One entry of a query answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Matched item, absent for aggregate rows.
    pub item_id: Option<i64>,
    /// Cosine similarity for vector hits, `1.0` for relational rows.
    pub score: f32,
    pub source: ResultSource,
    pub attributes: RelationalRow,
}

impl QueryResult {
    pub fn relational(row: RelationalRow) -> Self {
        let item_id = match &row {
            RelationalRow::Item(item) => Some(item.item_id),
            RelationalRow::Total(_) | RelationalRow::Store(_) => None,
        };
        Self {
            item_id,
            score: 1.0,
            source: ResultSource::Relational,
            attributes: row,
        }
    }

    pub fn vector(item: ItemAttributes, score: f32) -> Self {
        Self {
            item_id: Some(item.item_id),
            score,
            source: ResultSource::Vector,
            attributes: RelationalRow::Item(item),
        }
    }
}

/// Everything the router decided and found for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub intent: Intent,
    pub confidence: f32,
    pub parameters: Parameters,
    /// Paths in the order they ran.
    pub paths: Vec<ResultSource>,
    pub results: Vec<QueryResult>,
}

/// One line item handed to ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub item_name: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    /// Defaults to `total_price / quantity`.
    #[serde(default)]
    pub unit_price: Option<f64>,
    pub total_price: f64,
}

fn default_quantity() -> f64 {
    1.0
}

impl NewItem {
    pub fn unit_price(&self) -> f64 {
        match self.unit_price {
            Some(price) => price,
            None if self.quantity > 0.0 => self.total_price / self.quantity,
            None => self.total_price,
        }
    }
}

/// A normalized receipt handed to ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReceipt {
    pub store_name: String,
    pub receipt_date: NaiveDate,
    /// Defaults to the sum of item totals.
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub items: Vec<NewItem>,
}

impl NewReceipt {
    pub fn total_amount(&self) -> f64 {
        self.total_amount
            .unwrap_or_else(|| self.items.iter().map(|i| i.total_price).sum())
    }
}

/// A text document fed to the vector index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub item_id: i64,
    pub text: String,
}

/// Text indexed for an item: its name followed by the store name.
pub fn document_text(item_name: &str, store_name: &str) -> String {
    format!("{item_name} {store_name}")
}
