//! SQLite pool and schema.
//!
//! Both stores share one physical database file:
//! `{app_data_dir}/harbor/harbor.db` unless a directory is configured.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cache_entries (
        generation  TEXT    NOT NULL,
        partition   TEXT    NOT NULL,
        cache_key   TEXT    NOT NULL,
        status      INTEGER NOT NULL,
        headers     TEXT    NOT NULL,
        body        BLOB    NOT NULL,
        cached_at   TEXT    NOT NULL,
        PRIMARY KEY (generation, partition, cache_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mutation_queue (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        id            TEXT    NOT NULL UNIQUE,
        method        TEXT    NOT NULL,
        url           TEXT    NOT NULL,
        headers       TEXT    NOT NULL,
        body          BLOB    NOT NULL,
        status        TEXT    NOT NULL,
        attempts      INTEGER NOT NULL DEFAULT 0,
        last_error    TEXT    NULL,
        submitted_at  TEXT    NOT NULL,
        updated_at    TEXT    NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_mutation_queue_status
        ON mutation_queue(status, seq)
    "#,
];

/// Open (creating if needed) the database file in `dir` and apply the schema.
pub async fn open(dir: &Path) -> anyhow::Result<SqlitePool> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data directory at {:?}", dir))?;

    let path = dir.join("harbor.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open SQLite database at {:?}", path))?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Private in-memory database (tests/dev).
///
/// Pinned to a single connection: every new `:memory:` connection would
/// otherwise see its own empty database.
pub async fn open_in_memory() -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("invalid in-memory SQLite options")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("failed to open in-memory SQLite database")?;

    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("failed to apply harbor schema")?;
    }
    Ok(())
}

/// Default data directory: `{app_data_dir}/harbor`.
pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context(
            "failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share",
        )?;

    Ok(base.join("harbor"))
}
