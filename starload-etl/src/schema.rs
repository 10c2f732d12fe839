//! Schema manager for the star schema
//!
//! Owns the table definitions and the destructive rebuild that starts every
//! batch. Tables are created parents-first and dropped children-first:
//!
//! ```text
//! create: dim_entity_info → dim_genres … dim_serializations → fact_entity → entity_secondary_category
//! drop:   the reverse
//! ```
//!
//! DDL statements are not atomic as a group. Any failure aborts with
//! `Error::Schema`; a half-built schema is reported, never retried.

use crate::dimensions::Dimension;
use sqlx::SqlitePool;
use starload_common::db::{table_exists, ColumnDefinition, TableDefinition};
use starload_common::{Error, Result};
use tracing::{debug, info};

pub const ENTITY_TABLE: &str = "dim_entity_info";
pub const FACT_TABLE: &str = "fact_entity";
pub const BRIDGE_TABLE: &str = "entity_secondary_category";

/// Entity dimension: one row per external identifier
pub fn entity_table() -> TableDefinition {
    TableDefinition::new(ENTITY_TABLE)
        .column(ColumnDefinition::new("entity_info_id", "INTEGER").primary_key().autoincrement())
        .column(ColumnDefinition::new("external_id", "INTEGER").not_null().unique())
        .column(ColumnDefinition::new("title", "TEXT"))
        .column(ColumnDefinition::new("title_english", "TEXT"))
        .column(ColumnDefinition::new("title_japanese", "TEXT"))
        .column(ColumnDefinition::new("title_synonyms", "TEXT"))
        .column(ColumnDefinition::new("synopsis", "TEXT"))
        .column(ColumnDefinition::new("background", "TEXT"))
        .column(ColumnDefinition::new("status", "TEXT"))
        .column(ColumnDefinition::new("media_type", "TEXT"))
        .column(ColumnDefinition::new("publishing", "BOOLEAN").not_null().default("0"))
        .column(ColumnDefinition::new("published_from", "DATE"))
        .column(ColumnDefinition::new("published_to", "DATE"))
        .column(ColumnDefinition::new("approved", "BOOLEAN"))
        .column(ColumnDefinition::new("url", "TEXT"))
        .column(ColumnDefinition::new("images", "TEXT"))
}

/// Categorical dimension: surrogate key plus unique name
pub fn dimension_table(dimension: Dimension) -> TableDefinition {
    TableDefinition::new(dimension.table())
        .column(
            ColumnDefinition::new(dimension.key_column(), "INTEGER")
                .primary_key()
                .autoincrement(),
        )
        .column(ColumnDefinition::new(dimension.name_column(), "TEXT").not_null().unique())
}

/// Fact table: one row per entity, primary values as foreign keys
pub fn fact_table() -> TableDefinition {
    let mut table = TableDefinition::new(FACT_TABLE)
        .column(ColumnDefinition::new("fact_id", "INTEGER").primary_key().autoincrement())
        .column(
            ColumnDefinition::new("entity_info_id", "INTEGER")
                .not_null()
                .unique()
                .references(ENTITY_TABLE, "entity_info_id"),
        )
        .column(ColumnDefinition::new("score", "REAL"))
        .column(ColumnDefinition::new("scored_by", "INTEGER"))
        .column(ColumnDefinition::new("rank_val", "INTEGER"))
        .column(ColumnDefinition::new("popularity", "INTEGER"))
        .column(ColumnDefinition::new("members", "INTEGER"))
        .column(ColumnDefinition::new("favorites", "INTEGER"))
        .column(ColumnDefinition::new("volumes", "INTEGER"))
        .column(ColumnDefinition::new("chapters", "INTEGER"));

    for dimension in Dimension::ALL {
        table = table.column(
            ColumnDefinition::new(dimension.fact_column(), "INTEGER")
                .references(dimension.table(), dimension.key_column()),
        );
    }
    table
}

/// Bridge table: secondary genre associations
pub fn bridge_table() -> TableDefinition {
    let dimension = Dimension::Genres;
    TableDefinition::new(BRIDGE_TABLE)
        .column(
            ColumnDefinition::new("entity_info_id", "INTEGER")
                .not_null()
                .references(ENTITY_TABLE, "entity_info_id"),
        )
        .column(
            ColumnDefinition::new(dimension.key_column(), "INTEGER")
                .not_null()
                .references(dimension.table(), dimension.key_column()),
        )
        .composite_key(["entity_info_id", dimension.key_column()])
}

/// Every table in creation (dependency) order
pub fn star_schema() -> Vec<TableDefinition> {
    let mut tables = vec![entity_table()];
    tables.extend(Dimension::ALL.into_iter().map(dimension_table));
    tables.push(fact_table());
    tables.push(bridge_table());
    tables
}

/// Drop and recreate the whole star schema. All rows are lost.
pub async fn reset_schema(pool: &SqlitePool) -> Result<()> {
    let tables = star_schema();

    for table in tables.iter().rev() {
        debug!("Dropping {}", table.name);
        execute_ddl(pool, &table.name, &table.drop_sql()).await?;
    }

    for table in &tables {
        debug!("Creating {}", table.name);
        execute_ddl(pool, &table.name, &table.create_sql()).await?;
    }

    verify_schema(pool).await?;
    info!("Star schema recreated ({} tables)", tables.len());
    Ok(())
}

/// Fail unless every star schema table exists
pub async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    let mut missing = Vec::new();
    for table in star_schema() {
        if !table_exists(pool, &table.name).await? {
            missing.push(table.name);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema(format!(
            "star schema incomplete, missing tables: {}",
            missing.join(", ")
        )))
    }
}

async fn execute_ddl(pool: &SqlitePool, table: &str, sql: &str) -> Result<()> {
    sqlx::query(sql)
        .execute(pool)
        .await
        .map_err(|e| Error::Schema(format!("DDL failed for {}: {}", table, e)))?;
    Ok(())
}
