//! Downstream read side of the star schema
//!
//! Feature and reporting code reads one flat row per entity: the fact joined
//! to its entity row, with every primary dimension value resolved back to
//! its name. Secondary genres come from the bridge table separately.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use starload_common::Result;
use std::io::Write;

/// One entity with its measures and primary dimension names
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct DenormalizedEntity {
    pub external_id: i64,
    pub title: Option<String>,
    pub status: Option<String>,
    pub media_type: Option<String>,
    pub publishing: bool,
    pub published_from: Option<NaiveDate>,
    pub published_to: Option<NaiveDate>,
    pub approved: Option<bool>,
    pub score: Option<f64>,
    pub scored_by: Option<i64>,
    pub rank_val: Option<i64>,
    pub popularity: Option<i64>,
    pub members: Option<i64>,
    pub favorites: Option<i64>,
    pub volumes: Option<i64>,
    pub chapters: Option<i64>,
    pub genre_name: Option<String>,
    pub author_name: Option<String>,
    pub demographic_name: Option<String>,
    pub serialization_name: Option<String>,
}

/// Every fact row, flattened, ordered by external identifier
pub async fn fetch_denormalized(pool: &SqlitePool) -> Result<Vec<DenormalizedEntity>> {
    let rows = sqlx::query_as::<_, DenormalizedEntity>(
        r#"
        SELECT
            e.external_id, e.title, e.status, e.media_type, e.publishing,
            e.published_from, e.published_to, e.approved,
            f.score, f.scored_by, f.rank_val, f.popularity, f.members,
            f.favorites, f.volumes, f.chapters,
            g.genre_name, a.author_name, d.demographic_name, s.serialization_name
        FROM fact_entity f
        JOIN dim_entity_info e ON f.entity_info_id = e.entity_info_id
        LEFT JOIN dim_genres g ON f.primary_genre_id = g.genre_id
        LEFT JOIN dim_authors a ON f.primary_author_id = a.author_id
        LEFT JOIN dim_demographics d ON f.primary_demographic_id = d.demographic_id
        LEFT JOIN dim_serializations s ON f.primary_serialization_id = s.serialization_id
        ORDER BY e.external_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Write entities as CSV, header first. Returns the row count.
pub fn write_csv<W: Write>(rows: &[DenormalizedEntity], writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

/// Secondary genre names for one entity, alphabetical
pub async fn secondary_genres(pool: &SqlitePool, external_id: i64) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        r#"
        SELECT g.genre_name
        FROM entity_secondary_category b
        JOIN dim_entity_info e ON b.entity_info_id = e.entity_info_id
        JOIN dim_genres g ON b.genre_id = g.genre_id
        WHERE e.external_id = ?
        ORDER BY g.genre_name
        "#,
    )
    .bind(external_id)
    .fetch_all(pool)
    .await?;

    Ok(names)
}
