//! # Receipt Query CLI (`rq`)
//!
//! ## Usage
//!
//! ```bash
//! rq --config ./config/rq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rq init` | Create the SQLite database and run schema migrations |
//! | `rq ingest <file>` | Import receipts from a JSON file and index their items |
//! | `rq query "<text>"` | Answer a natural-language question |
//! | `rq similar <item_id>` | List items most like an indexed item |
//! | `rq rebuild` | Rebuild the vector index from the database |
//! | `rq stats` | Show database and index statistics |
//! | `rq suggest` | Print example questions |
//! | `rq serve` | Start the HTTP server |
//!
//! Logs go to stderr. Set `RUST_LOG` or pass `--verbose` for more detail.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use receipt_query::{config, engine, ingest, migrate, query_cmd, server, stats, suggest};

/// Receipt Query: ask questions about your grocery receipts.
#[derive(Parser)]
#[command(name = "rq", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "./config/rq.toml")]
    config: PathBuf,

    /// Log debug output (routing decisions, SQL, vector hits).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the receipts and items tables.
    /// Safe to run multiple times.
    Init,

    /// Import receipts from a JSON file.
    ///
    /// The file holds an array of receipts, each with `store_name`,
    /// `receipt_date` (YYYY-MM-DD), optional `total_amount`, and `items`
    /// (`item_name`, optional `quantity` and `unit_price`, `total_price`).
    /// New items are added to the vector index and the index file is saved.
    Ingest {
        /// Path to the receipts JSON file.
        file: PathBuf,

        /// Validate the file and show counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a natural-language question about your receipts.
    ///
    /// The question is classified, filters are extracted, and it is
    /// answered from SQL or from the vector index (or SQL first, falling
    /// back to the index when nothing matched).
    Query {
        /// The question, e.g. "how much did I spend last month".
        text: String,

        /// Date that "today", "this week", etc. are relative to (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,

        /// Phrase the answer with the configured chat model.
        #[arg(long)]
        answer: bool,
    },

    /// List the items most like an already indexed item.
    ///
    /// Uses the item's own vector, so no text is needed. The item itself
    /// is left out of the results.
    Similar {
        /// Item id, as shown by `rq query`.
        item_id: i64,

        /// Print the results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the vector index from the database.
    ///
    /// Re-tokenizes every stored item, recomputes IDF, and overwrites the
    /// index file.
    Rebuild,

    /// Show database and index statistics.
    Stats,

    /// Print example questions.
    Suggest,

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Suggest = cli.command {
        suggest::run_suggest();
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, dry_run } => {
            ingest::run_ingest(&cfg, &file, dry_run).await?;
        }
        Commands::Query {
            text,
            date,
            json,
            answer,
        } => {
            query_cmd::run_query(&cfg, &text, date, json, answer).await?;
        }
        Commands::Similar { item_id, json } => {
            query_cmd::run_similar(&cfg, item_id, json).await?;
        }
        Commands::Rebuild => {
            let engine = engine::Engine::open(&cfg).await?;
            let count = engine.rebuild().await?;
            println!("Index rebuilt: {} vectors.", count);
            engine.close().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Suggest => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
