//! Checkpoint model for resumable ingestion
//!
//! One checkpoint per source records how far the fetch loop got. The cursor
//! is opaque to the store: an offset for the feed and two-phase sources, a
//! page number for the paged JSON source.

use crate::domain::ids::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Persisted progress of one source
///
/// # Examples
///
/// ```
/// use scholarly_ingest::core::state::Checkpoint;
/// use scholarly_ingest::domain::SourceKind;
///
/// let checkpoint = Checkpoint::new(SourceKind::Arxiv, "200", 200)
///     .with_metadata("total_available", 5400);
///
/// assert_eq!(checkpoint.cursor_position(), Some(200));
/// assert_eq!(checkpoint.metadata_u64("total_available"), Some(5400));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source: SourceKind,

    /// Adapter-specific position to resume from
    pub cursor: String,

    /// Records staged for this source across all runs since the last clear
    pub records_processed: u64,

    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Checkpoint {
    pub fn new(source: SourceKind, cursor: impl Into<String>, records_processed: u64) -> Self {
        Self {
            source,
            cursor: cursor.into(),
            records_processed,
            last_updated: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Cursor as a number, for offset and page cursors
    pub fn cursor_position(&self) -> Option<u64> {
        self.cursor.trim().parse().ok()
    }

    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            source: self.source,
            cursor: self.cursor.clone(),
            records_processed: self.records_processed,
            last_updated: self.last_updated,
        }
    }
}

/// Listing entry for one stored checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub source: SourceKind,
    pub cursor: String,
    pub records_processed: u64,
    pub last_updated: DateTime<Utc>,
}
