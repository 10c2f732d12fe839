//! Fact materializer
//!
//! One `fact_entity` row per entity: the entity's surrogate key, its numeric
//! measures, and the key of the first-listed (primary) value in each
//! categorical dimension. Re-running a batch overwrites the row in place,
//! keyed on `entity_info_id`.

use crate::batch::{RawRecord, RecordBatch};
use crate::dimensions::{Dimension, DimensionKeyMaps};
use crate::entities::EntityKeys;
use crate::fields::{parse_external_id, parse_float, parse_int, SkipReason};
use crate::normalize::split_primary;
use crate::report::{Stage, StageReport};
use sqlx::SqlitePool;
use starload_common::Result;
use tracing::info;

/// Measures carried on the fact row; missing values stay NULL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measures {
    pub score: Option<f64>,
    pub scored_by: Option<i64>,
    pub rank: Option<i64>,
    pub popularity: Option<i64>,
    pub members: Option<i64>,
    pub favorites: Option<i64>,
    pub volumes: Option<i64>,
    pub chapters: Option<i64>,
}

impl Measures {
    pub fn from_record(record: &RawRecord) -> std::result::Result<Self, SkipReason> {
        Ok(Self {
            score: parse_float("score", record.score.as_deref())?,
            scored_by: parse_int("scored_by", record.scored_by.as_deref())?,
            rank: parse_int("rank", record.rank.as_deref())?,
            popularity: parse_int("popularity", record.popularity.as_deref())?,
            members: parse_int("members", record.members.as_deref())?,
            favorites: parse_int("favorites", record.favorites.as_deref())?,
            volumes: parse_int("volumes", record.volumes.as_deref())?,
            chapters: parse_int("chapters", record.chapters.as_deref())?,
        })
    }
}

/// Resolved fact row, ready to write
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub entity_info_id: i64,
    pub measures: Measures,
    pub primary_genre_id: Option<i64>,
    pub primary_author_id: Option<i64>,
    pub primary_demographic_id: Option<i64>,
    pub primary_serialization_id: Option<i64>,
}

impl FactRow {
    /// Resolve one record against the entity and dimension lookups.
    ///
    /// An empty or malformed list leaves that primary key NULL. A primary
    /// name that is missing from its lookup skips the row.
    pub fn from_record(
        record: &RawRecord,
        entities: &EntityKeys,
        dimensions: &DimensionKeyMaps,
    ) -> std::result::Result<Self, SkipReason> {
        let external_id = parse_external_id(record.external_id.as_deref())?;
        let entity_info_id = entities
            .get(external_id)
            .ok_or(SkipReason::UnknownEntity { external_id })?;
        let measures = Measures::from_record(record)?;

        let primary = |dimension: Dimension| -> std::result::Result<Option<i64>, SkipReason> {
            let names = dimension.names(record);
            match split_primary(&names).primary {
                None => Ok(None),
                Some(name) => dimensions
                    .resolve(dimension, name)
                    .map(Some)
                    .ok_or_else(|| SkipReason::UnresolvedName {
                        dimension,
                        name: name.to_string(),
                    }),
            }
        };

        Ok(Self {
            entity_info_id,
            measures,
            primary_genre_id: primary(Dimension::Genres)?,
            primary_author_id: primary(Dimension::Authors)?,
            primary_demographic_id: primary(Dimension::Demographics)?,
            primary_serialization_id: primary(Dimension::Serializations)?,
        })
    }
}

/// Insert the fact row, or overwrite measures and keys for a known entity
pub async fn upsert_fact(pool: &SqlitePool, row: &FactRow) -> sqlx::Result<()> {
    let m = &row.measures;
    sqlx::query(
        r#"
        INSERT INTO fact_entity (
            entity_info_id, score, scored_by, rank_val, popularity, members,
            favorites, volumes, chapters, primary_genre_id, primary_author_id,
            primary_demographic_id, primary_serialization_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(entity_info_id) DO UPDATE SET
            score = excluded.score,
            scored_by = excluded.scored_by,
            rank_val = excluded.rank_val,
            popularity = excluded.popularity,
            members = excluded.members,
            favorites = excluded.favorites,
            volumes = excluded.volumes,
            chapters = excluded.chapters,
            primary_genre_id = excluded.primary_genre_id,
            primary_author_id = excluded.primary_author_id,
            primary_demographic_id = excluded.primary_demographic_id,
            primary_serialization_id = excluded.primary_serialization_id
        "#,
    )
    .bind(row.entity_info_id)
    .bind(m.score)
    .bind(m.scored_by)
    .bind(m.rank)
    .bind(m.popularity)
    .bind(m.members)
    .bind(m.favorites)
    .bind(m.volumes)
    .bind(m.chapters)
    .bind(row.primary_genre_id)
    .bind(row.primary_author_id)
    .bind(row.primary_demographic_id)
    .bind(row.primary_serialization_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// One pass over the batch writing fact rows
pub async fn materialize_facts(
    pool: &SqlitePool,
    batch: &RecordBatch,
    entities: &EntityKeys,
    dimensions: &DimensionKeyMaps,
) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Facts);

    for record in &batch.records {
        let row = match FactRow::from_record(record, entities, dimensions) {
            Ok(row) => row,
            Err(reason) => {
                report.skip(record.display_id(), &reason);
                continue;
            }
        };

        match upsert_fact(pool, &row).await {
            Ok(()) => report.written += 1,
            Err(e) => report.skip(record.display_id(), &SkipReason::from_store_error(e)?),
        }
    }

    info!(
        "{}: {} rows upserted, {} skipped",
        crate::schema::FACT_TABLE,
        report.written,
        report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::DimensionKeys;

    fn lookups() -> (EntityKeys, DimensionKeyMaps) {
        let entities: EntityKeys = [(100, 1), (200, 2)].into_iter().collect();
        let mut maps = DimensionKeyMaps::default();
        maps.insert(
            Dimension::Genres,
            [("Action".to_string(), 10), ("Drama".to_string(), 11)]
                .into_iter()
                .collect::<DimensionKeys>(),
        );
        maps.insert(
            Dimension::Authors,
            [("Urasawa, Naoki".to_string(), 20)].into_iter().collect(),
        );
        (entities, maps)
    }

    fn record(id: &str) -> RawRecord {
        RawRecord {
            external_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_primary_is_first_listed() {
        let (entities, maps) = lookups();
        let mut rec = record("100");
        rec.genres = Some(r#"[{"name":"Drama"},{"name":"Action"}]"#.to_string());
        rec.authors = Some(r#"[{"name":"Urasawa, Naoki"}]"#.to_string());

        let row = FactRow::from_record(&rec, &entities, &maps).unwrap();
        assert_eq!(row.entity_info_id, 1);
        assert_eq!(row.primary_genre_id, Some(11));
        assert_eq!(row.primary_author_id, Some(20));
        assert_eq!(row.primary_demographic_id, None);
        assert_eq!(row.primary_serialization_id, None);
    }

    #[test]
    fn test_missing_measures_stay_null() {
        let (entities, maps) = lookups();
        let mut rec = record("200");
        rec.score = Some("7.9".to_string());
        rec.volumes = Some("18.0".to_string());

        let row = FactRow::from_record(&rec, &entities, &maps).unwrap();
        assert_eq!(row.measures.score, Some(7.9));
        assert_eq!(row.measures.volumes, Some(18));
        assert_eq!(row.measures.chapters, None);
        assert_eq!(row.measures.members, None);
    }

    #[test]
    fn test_row_level_failures() {
        let (entities, maps) = lookups();

        assert_eq!(
            FactRow::from_record(&record("300"), &entities, &maps),
            Err(SkipReason::UnknownEntity { external_id: 300 })
        );

        let mut bad_measure = record("100");
        bad_measure.members = Some("lots".to_string());
        assert!(matches!(
            FactRow::from_record(&bad_measure, &entities, &maps),
            Err(SkipReason::MalformedNumeric { field: "members", .. })
        ));

        let mut unresolved = record("100");
        unresolved.genres = Some(r#"["Horror"]"#.to_string());
        assert_eq!(
            FactRow::from_record(&unresolved, &entities, &maps),
            Err(SkipReason::UnresolvedName {
                dimension: Dimension::Genres,
                name: "Horror".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_list_gives_null_key() {
        let (entities, maps) = lookups();
        let mut rec = record("100");
        rec.genres = Some("[{'name': 'Action'}]".to_string());

        let row = FactRow::from_record(&rec, &entities, &maps).unwrap();
        assert_eq!(row.primary_genre_id, None);
    }
}
