//! Receipt import.
//!
//! Reads a JSON array of receipts, validates it, writes the rows to SQLite,
//! and feeds the new items into the vector index as one writer batch.

use std::path::Path;

use anyhow::{bail, Context, Result};

use receipt_query_core::models::NewReceipt;

use crate::config::Config;
use crate::engine::Engine;

/// Parse a receipts file.
pub fn load_receipts(path: &Path) -> Result<Vec<NewReceipt>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read receipts file: {}", path.display()))?;
    let receipts: Vec<NewReceipt> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse receipts file: {}", path.display()))?;
    for (i, receipt) in receipts.iter().enumerate() {
        validate(receipt).with_context(|| format!("receipt #{} is invalid", i + 1))?;
    }
    Ok(receipts)
}

/// Check one receipt before anything is written.
pub fn validate(receipt: &NewReceipt) -> Result<()> {
    if receipt.store_name.trim().is_empty() {
        bail!("store_name must not be empty");
    }
    if let Some(total) = receipt.total_amount {
        if !total.is_finite() || total < 0.0 {
            bail!("total_amount must be a non-negative number");
        }
    }
    for item in &receipt.items {
        if item.item_name.trim().is_empty() {
            bail!("item_name must not be empty");
        }
        if !item.total_price.is_finite() || item.total_price < 0.0 {
            bail!("total_price of '{}' must be a non-negative number", item.item_name);
        }
        if !item.quantity.is_finite() || item.quantity <= 0.0 {
            bail!("quantity of '{}' must be positive", item.item_name);
        }
        if let Some(unit) = item.unit_price {
            if !unit.is_finite() || unit < 0.0 {
                bail!("unit_price of '{}' must be a non-negative number", item.item_name);
            }
        }
    }
    Ok(())
}

pub async fn run_ingest(config: &Config, path: &Path, dry_run: bool) -> Result<()> {
    let receipts = load_receipts(path)?;

    if dry_run {
        let items: usize = receipts.iter().map(|r| r.items.len()).sum();
        println!("ingest {} (dry-run)", path.display());
        println!("  receipts found: {}", receipts.len());
        println!("  items found: {}", items);
        return Ok(());
    }

    let engine = Engine::open(config).await?;
    let summary = engine.ingest(&receipts).await?;

    println!("ingest {}", path.display());
    println!("  receipts inserted: {}", summary.receipts);
    println!("  items indexed: {}", summary.items);
    println!("  index vectors: {}", engine.index().snapshot().len());
    println!("ok");

    engine.close().await;
    Ok(())
}
