//! SQLite connection pools.
//!
//! Receipts are written by one ingest at a time while queries and the HTTP
//! server read concurrently, so file databases run in WAL mode with a busy
//! timeout instead of failing on a locked database.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the receipts database named in `config`, creating it if needed.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    open_file(&config.db.path).await
}

/// Open (or create) a database file and its parent directory.
pub async fn open_file(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database: {}", path.display()))
}

/// A private in-memory database with the schema applied.
///
/// Every connection to `:memory:` is a separate database, so the pool
/// holds exactly one.
#[cfg(test)]
pub(crate) async fn memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("failed to open in-memory database")?;
    crate::migrate::apply(&pool).await?;
    Ok(pool)
}
