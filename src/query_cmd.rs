//! `rq query` and `rq similar`: run one lookup and print the result.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fmt::Write;
use tracing::warn;

use receipt_query_core::models::{QueryResponse, QueryResult, RelationalRow};

use crate::answer;
use crate::config::Config;
use crate::engine::Engine;

/// Parse `--date`, or use today's local date.
pub fn resolve_now(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .with_context(|| format!("invalid --date '{}', expected YYYY-MM-DD", text)),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

pub async fn run_query(
    config: &Config,
    text: &str,
    date: Option<String>,
    json: bool,
    with_answer: bool,
) -> Result<()> {
    let now = resolve_now(date.as_deref())?;
    let engine = Engine::open(config).await?;
    let response = engine.query(text, now).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if with_answer {
        if config.answer.is_enabled() {
            match answer::generate_answer(&config.answer, &response).await {
                Ok(prose) => println!("{}", prose.trim()),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "answer generation failed, showing results");
                    print!("{}", render_text(&response));
                }
            }
        } else {
            warn!("answer generation is disabled in config, showing results");
            print!("{}", render_text(&response));
        }
    } else {
        print!("{}", render_text(&response));
    }

    engine.close().await;
    Ok(())
}

/// Deterministic plain-text rendering of a response.
pub fn render_text(response: &QueryResponse) -> String {
    let mut out = String::new();
    let paths: Vec<String> = response.paths.iter().map(|p| p.to_string()).collect();
    let _ = writeln!(
        out,
        "intent: {} ({:.2})  paths: {}",
        response.intent,
        response.confidence,
        paths.join(" -> ")
    );

    let params = &response.parameters;
    if let Some(range) = params.date_range {
        let _ = writeln!(out, "  dates: {} .. {}", range.start, range.end);
    }
    if let Some(ref store) = params.store {
        let _ = writeln!(out, "  store: {}", store);
    }
    if let Some(ref item) = params.item_name {
        let _ = writeln!(out, "  item: {}", item);
    }
    if let Some(amount) = params.amount {
        let _ = writeln!(out, "  amount: {} {:.2}", amount.op.sql_operator(), amount.value);
    }
    out.push('\n');

    write_results(&mut out, &response.results);
    out
}

/// `rq similar`: list the indexed items most like `item_id`.
pub async fn run_similar(config: &Config, item_id: i64, json: bool) -> Result<()> {
    let engine = Engine::open(config).await?;
    if !engine.index().snapshot().contains(item_id) {
        engine.close().await;
        anyhow::bail!("item {} is not in the vector index", item_id);
    }
    let results = engine.similar(item_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", render_similar(item_id, &results));
    }

    engine.close().await;
    Ok(())
}

pub fn render_similar(item_id: i64, results: &[QueryResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "similar to item {}", item_id);
    out.push('\n');
    write_results(&mut out, results);
    out
}

fn write_results(out: &mut String, results: &[QueryResult]) {
    if results.is_empty() {
        out.push_str("No results.\n");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        match &result.attributes {
            RelationalRow::Item(item) => {
                let _ = writeln!(
                    out,
                    "{}. [{:.2}] {} / {}",
                    i + 1,
                    result.score,
                    result.source,
                    item.item_name
                );
                let _ = writeln!(out, "    store: {}", item.store_name);
                let _ = writeln!(out, "    date: {}", item.receipt_date);
                let _ = writeln!(
                    out,
                    "    price: {:.2} ({} x {:.2})",
                    item.total_price, item.quantity, item.unit_price
                );
                let _ = writeln!(out, "    id: {}", item.item_id);
            }
            RelationalRow::Total(total) => {
                let _ = writeln!(out, "{}. total spent: {:.2}", i + 1, total.total);
                let _ = writeln!(out, "    receipts: {}", total.receipt_count);
                if let Some(range) = total.date_range {
                    let _ = writeln!(out, "    period: {} .. {}", range.start, range.end);
                }
            }
            RelationalRow::Store(visit) => {
                let _ = writeln!(out, "{}. {}", i + 1, visit.store_name);
                let _ = writeln!(out, "    purchases: {}", visit.purchases);
                let _ = writeln!(out, "    last: {}", visit.last_date);
                let _ = writeln!(out, "    spent: {:.2}", visit.spent);
            }
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receipt_query_core::models::{
        DateRange, Intent, ItemAttributes, Parameters, ResultSource, SpendingTotal, StoreVisit,
    };

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_resolve_now() {
        assert_eq!(resolve_now(Some("2024-06-15")).unwrap(), d(2024, 6, 15));
        assert!(resolve_now(Some("15/06/2024")).is_err());
    }

    #[test]
    fn test_render_total() {
        let range = DateRange::new(d(2024, 6, 9), d(2024, 6, 15));
        let response = QueryResponse {
            query: "how much did I spend this week".into(),
            intent: Intent::SpendingAnalysis,
            confidence: 0.9,
            parameters: Parameters {
                date_range: Some(range),
                ..Default::default()
            },
            paths: vec![ResultSource::Relational],
            results: vec![QueryResult::relational(RelationalRow::Total(SpendingTotal {
                total: 13.0,
                receipt_count: 2,
                date_range: Some(range),
            }))],
        };
        let text = render_text(&response);
        assert!(text.starts_with("intent: spending_analysis (0.90)  paths: relational\n"));
        assert!(text.contains("  dates: 2024-06-09 .. 2024-06-15"));
        assert!(text.contains("1. total spent: 13.00"));
        assert!(text.contains("    receipts: 2"));
    }

    #[test]
    fn test_render_items_and_empty() {
        let item = ItemAttributes {
            item_id: 7,
            item_name: "Greek Yogurt".into(),
            quantity: 2.0,
            unit_price: 3.0,
            total_price: 6.0,
            store_name: "Trader Joe's".into(),
            receipt_date: d(2024, 6, 12),
        };
        let mut response = QueryResponse {
            query: "greek snacks".into(),
            intent: Intent::ItemSearch,
            confidence: 0.4,
            parameters: Parameters::default(),
            paths: vec![ResultSource::Relational, ResultSource::Vector],
            results: vec![QueryResult::vector(item, 0.71)],
        };
        let text = render_text(&response);
        assert!(text.contains("paths: relational -> vector"));
        assert!(text.contains("1. [0.71] vector / Greek Yogurt"));
        assert!(text.contains("    price: 6.00 (2 x 3.00)"));

        response.results.clear();
        assert!(render_text(&response).ends_with("No results.\n"));
    }

    #[test]
    fn test_render_store_visits() {
        let response = QueryResponse {
            query: "where did I buy bread".into(),
            intent: Intent::StoreQuery,
            confidence: 0.9,
            parameters: Parameters {
                item_name: Some("bread".into()),
                ..Default::default()
            },
            paths: vec![ResultSource::Relational],
            results: vec![QueryResult::relational(RelationalRow::Store(StoreVisit {
                store_name: "Walmart".into(),
                purchases: 2,
                last_date: d(2024, 6, 10),
                spent: 5.5,
            }))],
        };
        let text = render_text(&response);
        assert!(text.contains("  item: bread"));
        assert!(text.contains("1. Walmart\n    purchases: 2\n    last: 2024-06-10\n    spent: 5.50\n"));
    }

    #[test]
    fn test_render_similar_empty() {
        assert_eq!(render_similar(4, &[]), "similar to item 4\n\nNo results.\n");
    }
}
