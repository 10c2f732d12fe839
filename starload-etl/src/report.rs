//! Per-stage counts and the batch summary

use crate::dimensions::Dimension;
use crate::fields::SkipReason;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// A load stage of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "dimension")]
pub enum Stage {
    Read,
    Entities,
    Dimension(Dimension),
    Facts,
    Bridges(Dimension),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Entities => f.write_str("entities"),
            Self::Dimension(d) => write!(f, "dimension:{}", d),
            Self::Facts => f.write_str("facts"),
            Self::Bridges(d) => write!(f, "bridges:{}", d),
        }
    }
}

/// Rows written and skipped by one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub written: u64,
    pub skipped: u64,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            written: 0,
            skipped: 0,
        }
    }

    /// Count and log a skipped row
    pub fn skip(&mut self, external_id: &str, reason: &SkipReason) {
        warn!(stage = %self.stage, external_id, "Skipping row: {}", reason);
        self.skipped += 1;
    }
}

/// Outcome of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_total: usize,
    pub stages: Vec<StageReport>,
}

impl BatchSummary {
    pub fn total_skipped(&self) -> u64 {
        self.stages.iter().map(|s| s.skipped).sum()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {} ({} rows)", self.run_id, self.rows_total)?;
        for report in &self.stages {
            writeln!(
                f,
                "  {:<28} written {:>6}  skipped {:>6}",
                report.stage.to_string(),
                report.written,
                report.skipped
            )?;
        }
        write!(
            f,
            "  finished in {} ms",
            (self.finished_at - self.started_at).num_milliseconds()
        )
    }
}
