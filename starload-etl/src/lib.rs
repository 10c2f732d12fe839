//! starload-etl - star schema ingestion
//!
//! Loads a tabular batch of entity records into a star schema: one entity
//! dimension, four categorical dimensions, a fact table holding primary
//! dimension values and a bridge table for secondary ones.
//!
//! Stages, in run order:
//! - [`schema`]: drop and recreate the tables
//! - [`entities`]: upsert the entity dimension
//! - [`dimensions`]: write distinct names and build name → key lookups
//! - [`facts`]: one fact row per entity
//! - [`bridges`]: secondary value associations
//!
//! [`pipeline::run_batch`] drives them in order.

pub mod batch;
pub mod bridges;
pub mod dimensions;
pub mod entities;
pub mod facts;
pub mod fields;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod report;
pub mod schema;
pub mod staging;

pub use batch::{RawRecord, RecordBatch};
pub use dimensions::Dimension;
pub use fields::SkipReason;
pub use pipeline::{run_batch, BatchState, IngestOptions};
pub use report::{BatchSummary, Stage, StageReport};
