//! SQLite connection pool.
//!
//! One pool serves both the HTTP handlers and the task worker. WAL mode
//! keeps message reads from blocking while the worker rewrites a
//! document's chunk set, and the busy timeout covers the brief write
//! lock those rewrites take. Pool size and timeout come from `[db]` in
//! the config file.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Open (creating if missing) the database at `[db].path`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db = &config.db;
    if let Some(parent) = db.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db.path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(db.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(db.max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}
