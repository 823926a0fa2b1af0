//! Checkpoint persistence
//!
//! [`CheckpointStore`] is the seam adapters depend on; [`FileCheckpointStore`]
//! keeps one JSON document per source in a directory, replacing it with a
//! temp-file write followed by an atomic rename.

use crate::core::state::checkpoint::{Checkpoint, CheckpointSummary};
use crate::domain::ids::SourceKind;
use crate::domain::{IngestError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Source-keyed progress store
///
/// One adapter owns one source key for the duration of a run.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest checkpoint for `source`, if any
    async fn get(&self, source: SourceKind) -> Result<Option<Checkpoint>>;

    /// Persists progress, replacing any previous checkpoint for `source`
    async fn save(
        &self,
        source: SourceKind,
        cursor: &str,
        records_processed: u64,
        metadata: Map<String, Value>,
    ) -> Result<Checkpoint>;

    /// Removes stored state for `source`; absent state is not an error
    async fn clear(&self, source: SourceKind) -> Result<()>;

    /// All stored checkpoints, ordered by source
    async fn list(&self) -> Result<Vec<CheckpointSummary>>;

    /// `(records_processed, cursor)`, or `(0, None)` with no checkpoint
    async fn progress(&self, source: SourceKind) -> Result<(u64, Option<String>)> {
        Ok(match self.get(source).await? {
            Some(checkpoint) => (checkpoint.records_processed, Some(checkpoint.cursor)),
            None => (0, None),
        })
    }
}

const CHECKPOINT_SUFFIX: &str = "_checkpoint.json";

/// Directory-backed checkpoint store with an in-memory cache
pub struct FileCheckpointStore {
    dir: PathBuf,
    cache: RwLock<HashMap<SourceKind, Checkpoint>>,
}

impl FileCheckpointStore {
    /// Opens (and creates if needed) the checkpoint directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            IngestError::Checkpoint(format!(
                "Failed to create checkpoint directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of a source's checkpoint file
    pub fn path_for(&self, source: SourceKind) -> PathBuf {
        self.dir.join(format!("{}{CHECKPOINT_SUFFIX}", source.as_str()))
    }

    fn temp_path_for(&self, source: SourceKind) -> PathBuf {
        self.dir
            .join(format!("{}{CHECKPOINT_SUFFIX}.tmp", source.as_str()))
    }

    async fn read_file(path: &Path) -> Result<Option<Checkpoint>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IngestError::Checkpoint(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            IngestError::Checkpoint(format!("Corrupt checkpoint {}: {e}", path.display()))
        })
    }

    async fn write_atomically(&self, source: SourceKind, checkpoint: &Checkpoint) -> Result<()> {
        let final_path = self.path_for(source);
        let temp_path = self.temp_path_for(source);
        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| encode_failure(source, e))?;

        let written = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp_path, &final_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(IngestError::Checkpoint(format!(
                "Failed to save checkpoint {}: {e}",
                final_path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, source: SourceKind) -> Result<Option<Checkpoint>> {
        if let Some(cached) = self.cache.read().await.get(&source) {
            return Ok(Some(cached.clone()));
        }

        let loaded = Self::read_file(&self.path_for(source)).await?;
        if let Some(checkpoint) = &loaded {
            self.cache.write().await.insert(source, checkpoint.clone());
        }
        Ok(loaded)
    }

    async fn save(
        &self,
        source: SourceKind,
        cursor: &str,
        records_processed: u64,
        metadata: Map<String, Value>,
    ) -> Result<Checkpoint> {
        let mut checkpoint = Checkpoint::new(source, cursor, records_processed);
        checkpoint.metadata = metadata;

        self.write_atomically(source, &checkpoint).await?;
        self.cache.write().await.insert(source, checkpoint.clone());

        tracing::debug!(
            source = %source,
            cursor,
            records_processed,
            "Saved checkpoint"
        );
        Ok(checkpoint)
    }

    async fn clear(&self, source: SourceKind) -> Result<()> {
        self.cache.write().await.remove(&source);

        let path = self.path_for(source);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(IngestError::Checkpoint(format!(
                    "Failed to clear {}: {e}",
                    path.display()
                )))
            }
        }

        tracing::info!(source = %source, "Cleared checkpoint");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let mut summaries = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            IngestError::Checkpoint(format!("Failed to list {}: {e}", self.dir.display()))
        })?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_checkpoint = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(CHECKPOINT_SUFFIX));
            if !is_checkpoint {
                continue;
            }
            match Self::read_file(&path).await {
                Ok(Some(checkpoint)) => summaries.push(checkpoint.summary()),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable checkpoint"),
            }
        }

        summaries.sort_by_key(|s| s.source);
        Ok(summaries)
    }
}

/// Encoding failures are checkpoint failures, fatal for the source
fn encode_failure(source: SourceKind, e: serde_json::Error) -> IngestError {
    IngestError::Checkpoint(format!("Failed to encode checkpoint for {source}: {e}"))
}
