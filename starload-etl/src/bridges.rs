//! Bridge materializer
//!
//! Secondary values (everything after the first-listed one) live only in the
//! bridge table, one `(entity, category)` pair per association. Writes are
//! insert-if-absent on the composite key, so a re-run adds nothing.

use crate::batch::{RawRecord, RecordBatch};
use crate::dimensions::{Dimension, DimensionKeyMaps};
use crate::entities::EntityKeys;
use crate::fields::{parse_external_id, SkipReason};
use crate::normalize::split_primary;
use crate::report::{Stage, StageReport};
use sqlx::SqlitePool;
use starload_common::{Error, Result};
use tracing::{info, warn};

/// One secondary association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeRow {
    pub entity_info_id: i64,
    pub category_id: i64,
}

/// Resolve a record's secondary values for `dimension`.
///
/// The outer error means the whole row is unusable (no entity). Inner
/// errors are single associations whose name did not resolve.
pub fn bridge_rows(
    record: &RawRecord,
    dimension: Dimension,
    entities: &EntityKeys,
    dimensions: &DimensionKeyMaps,
) -> std::result::Result<Vec<std::result::Result<BridgeRow, SkipReason>>, SkipReason> {
    let external_id = parse_external_id(record.external_id.as_deref())?;
    let entity_info_id = entities
        .get(external_id)
        .ok_or(SkipReason::UnknownEntity { external_id })?;

    let names = dimension.names(record);
    let rows = split_primary(&names)
        .secondary
        .into_iter()
        .map(|name| {
            dimensions
                .resolve(dimension, name)
                .map(|category_id| BridgeRow {
                    entity_info_id,
                    category_id,
                })
                .ok_or_else(|| SkipReason::UnresolvedName {
                    dimension,
                    name: name.to_string(),
                })
        })
        .collect();

    Ok(rows)
}

/// Insert the association unless it exists. Returns whether a row was added.
pub async fn insert_bridge(pool: &SqlitePool, dimension: Dimension, row: BridgeRow) -> Result<bool> {
    let table = dimension.bridge_table().ok_or_else(|| no_bridge(dimension))?;
    let sql = format!(
        "INSERT INTO {table} (entity_info_id, {key}) VALUES (?, ?) \
         ON CONFLICT(entity_info_id, {key}) DO NOTHING",
        table = table,
        key = dimension.key_column()
    );

    let result = sqlx::query(&sql)
        .bind(row.entity_info_id)
        .bind(row.category_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// One pass over the batch writing secondary associations for `dimension`.
///
/// `written` counts associations actually added; existing ones are neither
/// written nor skipped. A row without an entity counts as one skip, an
/// unresolved secondary name as one more.
pub async fn materialize_bridges(
    pool: &SqlitePool,
    batch: &RecordBatch,
    entities: &EntityKeys,
    dimensions: &DimensionKeyMaps,
    dimension: Dimension,
) -> Result<StageReport> {
    if dimension.bridge_table().is_none() {
        return Err(no_bridge(dimension));
    }

    let mut report = StageReport::new(Stage::Bridges(dimension));

    for record in &batch.records {
        let rows = match bridge_rows(record, dimension, entities, dimensions) {
            Ok(rows) => rows,
            Err(reason) => {
                report.skip(record.display_id(), &reason);
                continue;
            }
        };

        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(reason) => {
                    report.skip(record.display_id(), &reason);
                    continue;
                }
            };

            match insert_bridge(pool, dimension, row).await {
                Ok(true) => report.written += 1,
                Ok(false) => {}
                Err(Error::Database(e)) => {
                    report.skip(record.display_id(), &SkipReason::from_store_error(e)?)
                }
                Err(e) => return Err(e),
            }
        }
    }

    if report.skipped > 0 {
        warn!("{}: {} associations skipped", dimension, report.skipped);
    }
    info!(
        "{}: {} secondary {} associations added",
        crate::schema::BRIDGE_TABLE,
        report.written,
        dimension
    );
    Ok(report)
}

fn no_bridge(dimension: Dimension) -> Error {
    Error::InvalidInput(format!("dimension {} has no bridge table", dimension))
}
