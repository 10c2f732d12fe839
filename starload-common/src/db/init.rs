//! Database initialization
//!
//! Opens the SQLite store described by a [`ConnectionConfig`]. Failure to
//! connect is fatal for the batch: callers propagate the error and abort.

use crate::{ConnectionConfig, Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Open a connection pool and verify the store answers
pub async fn connect(config: &ConnectionConfig) -> Result<SqlitePool> {
    if !config.url.starts_with("sqlite:") {
        return Err(Error::Config(format!(
            "unsupported database URL '{}': expected a sqlite: URL",
            config.url
        )));
    }

    // Create parent directory if it doesn't exist
    if let Some(path) = config.database_path() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    // An in-memory database lives and dies with its connection, so keep
    // exactly one and never recycle it.
    let pool = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?
    };

    if !config.is_in_memory() {
        // WAL allows readers alongside the single writer
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
    }

    ping(&pool).await?;

    match config.database_path() {
        Some(path) => info!("Connected to database: {}", path.display()),
        None => info!("Connected to in-memory database"),
    }

    Ok(pool)
}

/// Round-trip `SELECT 1` against the store
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    debug!("Database ping returned {}", one);
    Ok(())
}

/// Check if a table exists
pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type = 'table' AND name = ?
        )
        "#,
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}
