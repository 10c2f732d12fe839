//! Batch pipeline
//!
//! Runs one batch through every stage in a fixed order:
//!
//! ```text
//! Pending → SchemaReset → EntityDimLoaded → CategoryDimLoaded(genres … serializations)
//!         → FactsLoaded → BridgesLoaded → Done
//! ```
//!
//! Each stage only starts once the previous one finished. Stages commit row
//! by row, so a failure part-way through leaves the store partially loaded;
//! the recovery path is another run from `SchemaReset`.

use crate::batch::RecordBatch;
use crate::bridges::materialize_bridges;
use crate::dimensions::{resolve_dimension, Dimension, DimensionKeyMaps};
use crate::entities::load_entities;
use crate::facts::materialize_facts;
use crate::report::{BatchSummary, Stage, StageReport};
use crate::schema::{reset_schema, verify_schema};
use chrono::Utc;
use sqlx::SqlitePool;
use starload_common::config::DEFAULT_CHUNK_SIZE;
use starload_common::{Error, IngestConfig, Result};
use std::fmt;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Where a batch is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    SchemaReset,
    EntityDimLoaded,
    CategoryDimLoaded(Dimension),
    FactsLoaded,
    BridgesLoaded,
    Done,
}

impl BatchState {
    /// Whether `next` may follow `self`. Category dimensions only move
    /// forward through [`Dimension::ALL`].
    pub fn can_advance_to(self, next: BatchState) -> bool {
        use BatchState::*;

        match (self, next) {
            (Pending, SchemaReset) | (SchemaReset, EntityDimLoaded) => true,
            (EntityDimLoaded, CategoryDimLoaded(_)) => true,
            (CategoryDimLoaded(prev), CategoryDimLoaded(dim)) => {
                dimension_rank(prev) < dimension_rank(dim)
            }
            (EntityDimLoaded | CategoryDimLoaded(_), FactsLoaded) => true,
            (FactsLoaded, BridgesLoaded) | (BridgesLoaded, Done) => true,
            _ => false,
        }
    }

    /// Move to `next`, or fail with `Error::InvalidState`
    pub fn advance(&mut self, next: BatchState) -> Result<()> {
        if !self.can_advance_to(next) {
            return Err(Error::InvalidState {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

fn dimension_rank(dimension: Dimension) -> usize {
    Dimension::ALL
        .iter()
        .position(|d| *d == dimension)
        .unwrap_or(usize::MAX)
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("PENDING"),
            Self::SchemaReset => f.write_str("SCHEMA_RESET"),
            Self::EntityDimLoaded => f.write_str("ENTITY_DIM_LOADED"),
            Self::CategoryDimLoaded(d) => write!(f, "CATEGORY_DIM_LOADED({})", d),
            Self::FactsLoaded => f.write_str("FACTS_LOADED"),
            Self::BridgesLoaded => f.write_str("BRIDGES_LOADED"),
            Self::Done => f.write_str("DONE"),
        }
    }
}

/// Per-run settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Drop and recreate the schema first; otherwise only check it exists
    pub reset_schema: bool,
    /// Names per multi-row dimension insert
    pub chunk_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            reset_schema: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl From<&IngestConfig> for IngestOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            reset_schema: config.reset_schema,
            chunk_size: config.chunk_size,
        }
    }
}

/// Load one batch into the star schema
pub async fn run_batch(
    pool: &SqlitePool,
    batch: &RecordBatch,
    options: &IngestOptions,
) -> Result<BatchSummary> {
    let run_id = Uuid::new_v4();
    let span = info_span!("batch", %run_id);
    execute(pool, batch, options, run_id).instrument(span).await
}

async fn execute(
    pool: &SqlitePool,
    batch: &RecordBatch,
    options: &IngestOptions,
    run_id: Uuid,
) -> Result<BatchSummary> {
    if options.chunk_size == 0 {
        return Err(Error::InvalidInput("chunk_size must be at least 1".to_string()));
    }

    let started_at = Utc::now();
    let mut state = BatchState::Pending;
    let mut stages = vec![StageReport {
        stage: Stage::Read,
        written: batch.len() as u64,
        skipped: batch.rejected as u64,
    }];
    info!("Starting batch of {} rows", batch.len());

    if options.reset_schema {
        reset_schema(pool).await?;
    } else {
        verify_schema(pool).await?;
        info!("Keeping existing star schema");
    }
    state.advance(BatchState::SchemaReset)?;

    let (entities, report) = load_entities(pool, batch).await?;
    stages.push(report);
    state.advance(BatchState::EntityDimLoaded)?;

    let mut dimensions = DimensionKeyMaps::default();
    for dimension in Dimension::ALL {
        let (keys, report) = resolve_dimension(pool, batch, dimension, options.chunk_size).await?;
        stages.push(report);
        dimensions.insert(dimension, keys);
        state.advance(BatchState::CategoryDimLoaded(dimension))?;
    }

    stages.push(materialize_facts(pool, batch, &entities, &dimensions).await?);
    state.advance(BatchState::FactsLoaded)?;

    for dimension in Dimension::ALL.into_iter().filter(|d| d.bridge_table().is_some()) {
        stages.push(materialize_bridges(pool, batch, &entities, &dimensions, dimension).await?);
    }
    state.advance(BatchState::BridgesLoaded)?;

    state.advance(BatchState::Done)?;
    let summary = BatchSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        rows_total: batch.len() + batch.rejected,
        stages,
    };
    info!(
        "Batch finished: {} rows, {} skipped across stages",
        summary.rows_total,
        summary.total_skipped()
    );
    Ok(summary)
}
