//! Dimension resolver
//!
//! Each categorical dimension (genres, authors, demographics,
//! serializations) is a `(surrogate key, unique name)` table shared by every
//! entity. Resolution is two-phase because keys are assigned by the store:
//!
//! 1. write every distinct name seen in the batch, skipping names that
//!    already exist (first writer wins, a name is never rewritten)
//! 2. re-read the *whole* table into a name → key map, so names left over
//!    from earlier batches resolve too
//!
//! No fact or bridge reference may be resolved before phase 2 completes.

use crate::batch::{RawRecord, RecordBatch};
use crate::normalize::normalize_names;
use crate::report::{Stage, StageReport};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use starload_common::Result;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// Categorical dimension backed by its own table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Genres,
    Authors,
    Demographics,
    Serializations,
}

impl Dimension {
    /// Load order within a batch
    pub const ALL: [Dimension; 4] = [
        Dimension::Genres,
        Dimension::Authors,
        Dimension::Demographics,
        Dimension::Serializations,
    ];

    /// Source column holding the raw list encoding
    pub fn label(self) -> &'static str {
        match self {
            Self::Genres => "genres",
            Self::Authors => "authors",
            Self::Demographics => "demographics",
            Self::Serializations => "serializations",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::Genres => "dim_genres",
            Self::Authors => "dim_authors",
            Self::Demographics => "dim_demographics",
            Self::Serializations => "dim_serializations",
        }
    }

    pub fn key_column(self) -> &'static str {
        match self {
            Self::Genres => "genre_id",
            Self::Authors => "author_id",
            Self::Demographics => "demographic_id",
            Self::Serializations => "serialization_id",
        }
    }

    pub fn name_column(self) -> &'static str {
        match self {
            Self::Genres => "genre_name",
            Self::Authors => "author_name",
            Self::Demographics => "demographic_name",
            Self::Serializations => "serialization_name",
        }
    }

    /// Fact column holding the primary value's key
    pub fn fact_column(self) -> &'static str {
        match self {
            Self::Genres => "primary_genre_id",
            Self::Authors => "primary_author_id",
            Self::Demographics => "primary_demographic_id",
            Self::Serializations => "primary_serialization_id",
        }
    }

    /// Bridge table for secondary values; only genres keep them
    pub fn bridge_table(self) -> Option<&'static str> {
        match self {
            Self::Genres => Some(crate::schema::BRIDGE_TABLE),
            _ => None,
        }
    }

    pub fn raw_value(self, record: &RawRecord) -> Option<&str> {
        match self {
            Self::Genres => record.genres.as_deref(),
            Self::Authors => record.authors.as_deref(),
            Self::Demographics => record.demographics.as_deref(),
            Self::Serializations => record.serializations.as_deref(),
        }
    }

    /// Normalized names of this dimension for one row
    pub fn names(self, record: &RawRecord) -> Vec<String> {
        normalize_names(self.raw_value(record))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Name → surrogate key lookup for one dimension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionKeys {
    keys: HashMap<String, i64>,
}

impl DimensionKeys {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.keys.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl FromIterator<(String, i64)> for DimensionKeys {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Lookups for every dimension, filled in as each one resolves
#[derive(Debug, Clone, Default)]
pub struct DimensionKeyMaps {
    maps: HashMap<Dimension, DimensionKeys>,
}

impl DimensionKeyMaps {
    pub fn insert(&mut self, dimension: Dimension, keys: DimensionKeys) {
        self.maps.insert(dimension, keys);
    }

    /// Lookup for a dimension; an unresolved dimension resolves nothing
    pub fn get(&self, dimension: Dimension) -> Option<&DimensionKeys> {
        self.maps.get(&dimension)
    }

    pub fn resolve(&self, dimension: Dimension, name: &str) -> Option<i64> {
        self.get(dimension).and_then(|keys| keys.get(name))
    }
}

/// Distinct non-empty names across the batch, in first-seen order
pub fn distinct_names(batch: &RecordBatch, dimension: Dimension) -> Vec<String> {
    let mut seen = HashSet::new();
    batch
        .records
        .iter()
        .flat_map(|record| dimension.names(record))
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Write the batch's names for `dimension` and return the full lookup.
/// The report counts names actually added.
pub async fn resolve_dimension(
    pool: &SqlitePool,
    batch: &RecordBatch,
    dimension: Dimension,
    chunk_size: usize,
) -> Result<(DimensionKeys, StageReport)> {
    let names = distinct_names(batch, dimension);
    let mut report = StageReport::new(Stage::Dimension(dimension));
    report.written = insert_names(pool, dimension, &names, chunk_size).await?;

    info!(
        "{}: {} distinct names in batch, {} new",
        dimension.table(),
        names.len(),
        report.written
    );

    let keys = load_dimension_keys(pool, dimension).await?;
    Ok((keys, report))
}

/// Insert names that are not present yet, `chunk_size` rows per statement.
/// Returns how many rows were actually added.
pub async fn insert_names(
    pool: &SqlitePool,
    dimension: Dimension,
    names: &[String],
    chunk_size: usize,
) -> Result<u64> {
    let mut inserted = 0;

    for chunk in names.chunks(chunk_size.max(1)) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            dimension.table(),
            dimension.name_column()
        ));
        builder.push_values(chunk, |mut row, name| {
            row.push_bind(name);
        });
        builder.push(format!(" ON CONFLICT({}) DO NOTHING", dimension.name_column()));

        let result = builder.build().execute(pool).await?;
        debug!(
            "{}: chunk of {} names, {} inserted",
            dimension.table(),
            chunk.len(),
            result.rows_affected()
        );
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

/// Read the entire dimension table into a lookup
pub async fn load_dimension_keys(pool: &SqlitePool, dimension: Dimension) -> Result<DimensionKeys> {
    let sql = format!(
        "SELECT {}, {} FROM {}",
        dimension.name_column(),
        dimension.key_column(),
        dimension.table()
    );
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(pool).await?;

    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::reset_schema;
    use starload_common::db::connect;
    use starload_common::ConnectionConfig;

    fn record(id: &str, genres: Option<&str>) -> RawRecord {
        RawRecord {
            external_id: Some(id.to_string()),
            genres: genres.map(str::to_string),
            ..Default::default()
        }
    }

    fn batch(records: Vec<RawRecord>) -> RecordBatch {
        RecordBatch::from_records(["external_id", "genres"], records)
    }

    async fn fresh_pool() -> SqlitePool {
        let pool = connect(&ConnectionConfig::in_memory()).await.unwrap();
        reset_schema(&pool).await.unwrap();
        pool
    }

    #[test]
    fn test_distinct_names_dedupes_across_rows_and_positions() {
        let batch = batch(vec![
            record("1", Some(r#"[{"name":"Action"},{"name":"Drama"}]"#)),
            record("2", Some(r#"[{"name":"Drama"},{"name":"Action"}]"#)),
            record("3", None),
        ]);
        assert_eq!(distinct_names(&batch, Dimension::Genres), vec!["Action", "Drama"]);
        assert!(distinct_names(&batch, Dimension::Authors).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let pool = fresh_pool().await;
        let batch = batch(vec![
            record("1", Some(r#"[{"name":"Action"},{"name":"Drama"}]"#)),
            record("2", Some(r#"[{"name":"Drama"}]"#)),
        ]);

        let (first, report) = resolve_dimension(&pool, &batch, Dimension::Genres, 500).await.unwrap();
        assert_eq!(report.written, 2);
        let (second, report) = resolve_dimension(&pool, &batch, Dimension::Genres, 500).await.unwrap();
        assert_eq!(report.written, 0);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dim_genres")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn test_existing_names_keep_their_keys() {
        let pool = fresh_pool().await;

        let earlier = batch(vec![record("1", Some(r#"["Horror"]"#))]);
        let (before, _) = resolve_dimension(&pool, &earlier, Dimension::Genres, 500).await.unwrap();

        let later = batch(vec![record("2", Some(r#"["Comedy", "Horror"]"#))]);
        let (after, report) = resolve_dimension(&pool, &later, Dimension::Genres, 500).await.unwrap();
        assert_eq!(report.written, 1);

        assert_eq!(before.get("Horror"), after.get("Horror"));
        assert!(after.get("Comedy").is_some());
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn test_small_chunks_insert_everything() {
        let pool = fresh_pool().await;
        let genres: Vec<String> = (0..7).map(|i| format!("\"g{}\"", i)).collect();
        let raw = format!("[{}]", genres.join(","));
        let batch = batch(vec![record("1", Some(&raw))]);

        let (keys, _) = resolve_dimension(&pool, &batch, Dimension::Genres, 3).await.unwrap();
        assert_eq!(keys.len(), 7);
    }

    #[tokio::test]
    async fn test_empty_batch_yields_empty_map() {
        let pool = fresh_pool().await;
        let (keys, _) = resolve_dimension(&pool, &RecordBatch::default(), Dimension::Authors, 500)
            .await
            .unwrap();
        assert!(keys.is_empty());
    }
}
