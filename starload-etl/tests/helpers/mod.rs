//! Test Helper Utilities
//!
//! Shared database and batch setup for the starload-etl integration tests

#![allow(dead_code)]

use anyhow::Result;
use sqlx::SqlitePool;
use starload_common::db::connect;
use starload_common::ConnectionConfig;
use starload_etl::RecordBatch;
use tempfile::TempDir;

/// Single-connection in-memory store
pub async fn memory_pool() -> Result<SqlitePool> {
    Ok(connect(&ConnectionConfig::in_memory()).await?)
}

/// File-backed store in a temp dir
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let url = format!("sqlite://{}", temp_dir.path().join("starload_test.db").display());
    let pool = connect(&ConnectionConfig::new(url)).await?;
    Ok((temp_dir, pool))
}

/// Parse an inline CSV batch
pub fn batch(csv: &str) -> RecordBatch {
    RecordBatch::from_reader(csv.as_bytes()).expect("test batch should parse")
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn genre_key(pool: &SqlitePool, name: &str) -> Option<i64> {
    sqlx::query_scalar("SELECT genre_id FROM dim_genres WHERE genre_name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .unwrap()
}

pub async fn entity_key(pool: &SqlitePool, external_id: i64) -> Option<i64> {
    sqlx::query_scalar("SELECT entity_info_id FROM dim_entity_info WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .unwrap()
}

/// Primary genre key on the fact row of one entity
pub async fn fact_genre(pool: &SqlitePool, external_id: i64) -> Option<i64> {
    sqlx::query_scalar(
        r#"
        SELECT f.primary_genre_id
        FROM fact_entity f
        JOIN dim_entity_info e ON f.entity_info_id = e.entity_info_id
        WHERE e.external_id = ?
        "#,
    )
    .bind(external_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Bridge rows as (external_id, genre_name), sorted
pub async fn bridge_pairs(pool: &SqlitePool) -> Vec<(i64, String)> {
    sqlx::query_as(
        r#"
        SELECT e.external_id, g.genre_name
        FROM entity_secondary_category b
        JOIN dim_entity_info e ON b.entity_info_id = e.entity_info_id
        JOIN dim_genres g ON b.genre_id = g.genre_id
        ORDER BY e.external_id, g.genre_name
        "#,
    )
    .fetch_all(pool)
    .await
    .unwrap()
}
