//! Entity dimension loader
//!
//! One `dim_entity_info` row per external identifier. Unlike the
//! categorical dimensions, a repeated identifier overwrites every
//! descriptive column (last write wins). After all rows are written the
//! full `external_id → entity_info_id` map is re-read, which is what the
//! fact and bridge stages resolve against.

use crate::batch::{RawRecord, RecordBatch};
use crate::fields::{parse_bool, parse_date, parse_external_id, text, SkipReason};
use crate::report::{Stage, StageReport};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use starload_common::Result;
use std::collections::HashMap;
use tracing::info;

const PUBLISHING_STATUS: &str = "Publishing";

/// Typed entity dimension row
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    pub external_id: i64,
    pub title: Option<String>,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    pub title_synonyms: Option<String>,
    pub synopsis: Option<String>,
    pub background: Option<String>,
    pub status: Option<String>,
    pub media_type: Option<String>,
    pub publishing: bool,
    pub published_from: Option<NaiveDate>,
    pub published_to: Option<NaiveDate>,
    pub approved: Option<bool>,
    pub url: Option<String>,
    pub images: Option<String>,
}

impl EntityRow {
    /// Build the row for one record.
    ///
    /// `approved` is `false` when the batch has no such column at all, and
    /// NULL when the column exists but the cell is empty.
    pub fn from_record(
        record: &RawRecord,
        has_approved_column: bool,
    ) -> std::result::Result<Self, SkipReason> {
        let external_id = parse_external_id(record.external_id.as_deref())?;
        let status = text(record.status.as_deref());

        let approved = if has_approved_column {
            parse_bool("approved", record.approved.as_deref())?
        } else {
            Some(false)
        };

        Ok(Self {
            external_id,
            title: text(record.title.as_deref()),
            title_english: text(record.title_english.as_deref()),
            title_japanese: text(record.title_japanese.as_deref()),
            title_synonyms: text(record.title_synonyms.as_deref()),
            synopsis: text(record.synopsis.as_deref()),
            background: text(record.background.as_deref()),
            publishing: status.as_deref() == Some(PUBLISHING_STATUS),
            status,
            media_type: text(record.media_type.as_deref()),
            published_from: parse_date("published_from", record.published_from.as_deref())?,
            published_to: parse_date("published_to", record.published_to.as_deref())?,
            approved,
            url: text(record.url.as_deref()),
            images: text(record.images.as_deref()),
        })
    }
}

/// External identifier → entity surrogate key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityKeys {
    keys: HashMap<i64, i64>,
}

impl EntityKeys {
    pub fn get(&self, external_id: i64) -> Option<i64> {
        self.keys.get(&external_id).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<(i64, i64)> for EntityKeys {
    fn from_iter<T: IntoIterator<Item = (i64, i64)>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Insert or overwrite one entity row
pub async fn upsert_entity(pool: &SqlitePool, row: &EntityRow) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dim_entity_info (
            external_id, title, title_english, title_japanese, title_synonyms,
            synopsis, background, status, media_type, publishing,
            published_from, published_to, approved, url, images
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO UPDATE SET
            title = excluded.title,
            title_english = excluded.title_english,
            title_japanese = excluded.title_japanese,
            title_synonyms = excluded.title_synonyms,
            synopsis = excluded.synopsis,
            background = excluded.background,
            status = excluded.status,
            media_type = excluded.media_type,
            publishing = excluded.publishing,
            published_from = excluded.published_from,
            published_to = excluded.published_to,
            approved = excluded.approved,
            url = excluded.url,
            images = excluded.images
        "#,
    )
    .bind(row.external_id)
    .bind(&row.title)
    .bind(&row.title_english)
    .bind(&row.title_japanese)
    .bind(&row.title_synonyms)
    .bind(&row.synopsis)
    .bind(&row.background)
    .bind(&row.status)
    .bind(&row.media_type)
    .bind(row.publishing)
    .bind(row.published_from)
    .bind(row.published_to)
    .bind(row.approved)
    .bind(&row.url)
    .bind(&row.images)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert every row of the batch, then read back the full key map
pub async fn load_entities(
    pool: &SqlitePool,
    batch: &RecordBatch,
) -> Result<(EntityKeys, StageReport)> {
    let mut report = StageReport::new(Stage::Entities);
    let has_approved_column = batch.has_column("approved");

    for record in &batch.records {
        let row = match EntityRow::from_record(record, has_approved_column) {
            Ok(row) => row,
            Err(reason) => {
                report.skip(record.display_id(), &reason);
                continue;
            }
        };

        match upsert_entity(pool, &row).await {
            Ok(()) => report.written += 1,
            Err(e) => report.skip(record.display_id(), &SkipReason::from_store_error(e)?),
        }
    }

    let keys = load_entity_keys(pool).await?;
    info!(
        "{}: {} rows upserted, {} skipped, {} entities known",
        crate::schema::ENTITY_TABLE,
        report.written,
        report.skipped,
        keys.len()
    );

    Ok((keys, report))
}

pub async fn load_entity_keys(pool: &SqlitePool) -> Result<EntityKeys> {
    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT external_id, entity_info_id FROM dim_entity_info")
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().collect())
}
