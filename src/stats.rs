//! Database and index statistics.
//!
//! Summarizes what is stored and indexed: receipt and item counts, the
//! covered date span, vocabulary and vector counts, file sizes, and a
//! per-store breakdown. Used by `rq stats` and `GET /stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;

use crate::config::Config;
use crate::engine::Engine;

/// Per-store receipt counts and spend.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub store_name: String,
    pub receipts: i64,
    pub items: i64,
    pub spent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub receipts: i64,
    pub items: i64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub vectors: usize,
    pub terms: usize,
    pub db_bytes: u64,
    pub index_bytes: u64,
    pub stores: Vec<StoreStats>,
}

pub async fn collect_stats(config: &Config, engine: &Engine) -> Result<Stats> {
    let pool = engine.store().pool();

    let receipts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM receipts")
        .fetch_one(pool)
        .await?;
    let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(pool)
        .await?;

    let span = sqlx::query("SELECT MIN(receipt_date) AS first, MAX(receipt_date) AS last FROM receipts")
        .fetch_one(pool)
        .await?;

    let store_rows = sqlx::query(
        r#"
        SELECT
            r.store_name,
            COUNT(DISTINCT r.id) AS receipts,
            COUNT(i.id) AS items,
            COALESCE(SUM(i.total_price), 0.0) AS spent
        FROM receipts r
        LEFT JOIN items i ON i.receipt_id = r.id
        GROUP BY r.store_name
        ORDER BY receipts DESC, r.store_name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let stores = store_rows
        .iter()
        .map(|row| StoreStats {
            store_name: row.get("store_name"),
            receipts: row.get("receipts"),
            items: row.get("items"),
            spent: row.get("spent"),
        })
        .collect();

    let snapshot = engine.index().snapshot();
    Ok(Stats {
        receipts,
        items,
        first_date: span.get("first"),
        last_date: span.get("last"),
        vectors: snapshot.len(),
        terms: snapshot.vocabulary().len(),
        db_bytes: file_size(&config.db.path),
        index_bytes: file_size(&config.index.path),
        stores,
    })
}

fn file_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Run the stats command: collect and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let engine = Engine::open(config).await?;
    let stats = collect_stats(config, &engine).await?;

    println!("receipt-query stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(stats.db_bytes));
    println!("  Index:       {}", config.index.path.display());
    println!("  Index size:  {}", format_bytes(stats.index_bytes));
    println!();
    println!("  Receipts:    {}", stats.receipts);
    println!("  Items:       {}", stats.items);
    if let (Some(first), Some(last)) = (&stats.first_date, &stats.last_date) {
        println!("  Dates:       {} .. {}", first, last);
    }
    println!("  Vectors:     {} / {}", stats.vectors, stats.items);
    println!("  Vocabulary:  {} terms", stats.terms);

    if !stats.stores.is_empty() {
        println!();
        println!("  By store:");
        println!(
            "  {:<24} {:>8} {:>6} {:>10}",
            "STORE", "RECEIPTS", "ITEMS", "SPENT"
        );
        println!("  {}", "-".repeat(52));
        for s in &stats.stores {
            println!(
                "  {:<24} {:>8} {:>6} {:>10.2}",
                s.store_name, s.receipts, s.items, s.spent
            );
        }
    }

    println!();
    engine.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
