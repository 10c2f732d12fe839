//! Input batch loading
//!
//! A batch is one CSV file with a header row, one row per entity. Every
//! cell is kept as text here; typed parsing happens per row later so a bad
//! value costs one row, not the batch.

use serde::Deserialize;
use starload_common::{Error, Result};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// One source row as read from the batch
///
/// Empty cells and absent columns are both `None`. Use
/// [`RecordBatch::has_column`] when the difference matters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    #[serde(alias = "mal_id")]
    pub external_id: Option<String>,

    pub title: Option<String>,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    pub title_synonyms: Option<String>,
    pub synopsis: Option<String>,
    pub background: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub published_from: Option<String>,
    pub published_to: Option<String>,
    pub approved: Option<String>,
    pub url: Option<String>,
    pub images: Option<String>,

    pub score: Option<String>,
    pub scored_by: Option<String>,
    pub rank: Option<String>,
    pub popularity: Option<String>,
    pub members: Option<String>,
    pub favorites: Option<String>,
    pub volumes: Option<String>,
    pub chapters: Option<String>,

    // Multi-valued attributes, raw list encodings
    pub genres: Option<String>,
    pub authors: Option<String>,
    pub demographics: Option<String>,
    pub serializations: Option<String>,
}

impl RawRecord {
    /// External identifier as written in the source, for log lines
    pub fn display_id(&self) -> &str {
        self.external_id.as_deref().unwrap_or("<missing>")
    }
}

/// In-memory batch handed over by the extraction step
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    /// Header names in source order
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
    /// Rows the CSV reader could not decode
    pub rejected: usize,
}

impl RecordBatch {
    /// Build a batch directly; `columns` lists which source columns exist
    pub fn from_records<I, S>(columns: I, records: Vec<RawRecord>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            records,
            rejected: 0,
        }
    }

    /// Load a CSV file. A missing file or unreadable header is fatal.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let batch = Self::from_reader(file)?;
        info!(
            "Read {} rows ({} rejected) from {}",
            batch.records.len(),
            batch.rejected,
            path.display()
        );
        Ok(batch)
    }

    /// Header names are trimmed. `mal_id` is accepted in place of
    /// `external_id`, but a header carrying both is rejected.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if columns.iter().any(|c| c == "external_id") && columns.iter().any(|c| c == "mal_id") {
            return Err(Error::InvalidInput(
                "batch has both external_id and mal_id columns".to_string(),
            ));
        }

        let mut records = Vec::new();
        let mut rejected = 0;
        for (index, row) in rdr.deserialize::<RawRecord>().enumerate() {
            match row {
                Ok(record) => records.push(record),
                Err(e) => {
                    // +2: header line plus 1-based numbering
                    warn!("Skipping unreadable CSV row {}: {}", index + 2, e);
                    rejected += 1;
                }
            }
        }

        Ok(Self {
            columns,
            records,
            rejected,
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
