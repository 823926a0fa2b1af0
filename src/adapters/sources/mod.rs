//! Upstream bibliographic sources
//!
//! Each source implements [`SourceAdapter`], a single `ingest()` contract.
//! The adapters share the fetch loop in [`pagination`] and differ only in
//! query construction and response parsing:
//!
//! - [`FeedAdapter`] - arXiv Atom feed, optional year-balanced sampling
//! - [`TwoPhaseAdapter`] - PubMed ESearch then EFetch
//! - [`PagedJsonAdapter`] - OpenAlex works, numbered pages
//!
//! Everything an adapter touches (checkpoint store, writer, transport,
//! shutdown signal) arrives through [`AdapterContext`].

pub mod feed;
pub mod paged_json;
pub mod pagination;
pub mod two_phase;
pub mod xml;

pub use feed::FeedAdapter;
pub use paged_json::PagedJsonAdapter;
pub use pagination::{FetchLoop, Page, PageSource, Pagination, Progress, Segment, SegmentEnd};
pub use two_phase::TwoPhaseAdapter;

use crate::adapters::http::RetryableTransport;
use crate::core::ingest::SourceResult;
use crate::core::state::{Checkpoint, CheckpointStore};
use crate::core::storage::PartitionedWriter;
use crate::domain::{Result, SourceKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// One upstream source
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Runs the bounded fetch loop for this source
    ///
    /// Never fails as a whole: page errors and a fatal abort are both
    /// reported through [`SourceResult::errors`].
    async fn ingest(&self) -> SourceResult;
}

/// Collaborators injected into every adapter
#[derive(Clone)]
pub struct AdapterContext {
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub writer: PartitionedWriter,
    /// Dedicated to one source; carries that source's rate limiter
    pub transport: Arc<RetryableTransport>,
    pub shutdown: watch::Receiver<bool>,
    /// Resume from an existing checkpoint instead of starting over
    pub resume: bool,
}

impl AdapterContext {
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Checkpoint to resume from, if resuming is enabled
    pub async fn resume_point(&self, source: SourceKind) -> Result<Option<Checkpoint>> {
        if !self.resume {
            return Ok(None);
        }
        let checkpoint = self.checkpoints.get(source).await?;
        if let Some(cp) = &checkpoint {
            tracing::info!(
                source = %source,
                cursor = %cp.cursor,
                records_processed = cp.records_processed,
                "Resuming from checkpoint"
            );
        }
        Ok(checkpoint)
    }

    /// Builds the source result and clears the checkpoint after a clean run
    ///
    /// The checkpoint stays in place when any error was recorded, the run
    /// was interrupted or the source aborted.
    pub async fn finish(
        &self,
        source: SourceKind,
        mut progress: Progress,
        outcome: Result<()>,
    ) -> SourceResult {
        let aborted = match outcome {
            Ok(()) => false,
            Err(e) => {
                tracing::error!(source = %source, error = %e, "Source aborted");
                progress.errors.push(format!("Aborted: {e}"));
                true
            }
        };

        if progress.errors.is_empty() && !progress.interrupted {
            if let Err(e) = self.checkpoints.clear(source).await {
                progress.errors.push(format!("Failed to clear checkpoint: {e}"));
            }
        }

        SourceResult {
            source,
            records_ingested: progress.ingested,
            batches: progress.batches,
            citations_count: progress.citations,
            errors: progress.errors,
            rate_limit_stats: Some(self.transport.stats().await),
            interrupted: progress.interrupted,
            aborted,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::http::transport::tests::ScriptedBackend;
    use crate::adapters::http::{HttpBackend, RateLimiter, RetryPolicy};
    use crate::core::state::FileCheckpointStore;
    use std::path::Path;

    /// Context over scratch directories with a backend that is never called
    pub(crate) fn test_context(dir: &Path) -> (AdapterContext, watch::Sender<bool>) {
        test_context_with(dir, ScriptedBackend::new(vec![]))
    }

    pub(crate) fn test_context_with(
        dir: &Path,
        backend: Arc<dyn HttpBackend>,
    ) -> (AdapterContext, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let transport = RetryableTransport::new(
            backend,
            Arc::new(RateLimiter::new(1000.0, 10)),
            RetryPolicy::default(),
        );
        let ctx = AdapterContext {
            checkpoints: Arc::new(FileCheckpointStore::new(dir.join("checkpoints")).unwrap()),
            writer: PartitionedWriter::new(dir.join("raw"), false).unwrap(),
            transport: Arc::new(transport),
            shutdown: rx,
            resume: true,
        };
        (ctx, tx)
    }

    #[tokio::test]
    async fn test_finish_clears_checkpoint_after_clean_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ctx, _tx) = test_context(dir.path());
        ctx.checkpoints
            .save(SourceKind::Arxiv, "10", 10, Default::default())
            .await
            .unwrap();
        let progress = Progress {
            ingested: 10,
            batches: 1,
            ..Progress::default()
        };

        let result = ctx.finish(SourceKind::Arxiv, progress, Ok(())).await;

        assert!(result.errors.is_empty());
        assert!(!result.aborted);
        assert!(ctx.checkpoints.get(SourceKind::Arxiv).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finish_keeps_checkpoint_after_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ctx, _tx) = test_context(dir.path());
        ctx.checkpoints
            .save(SourceKind::Arxiv, "10", 10, Default::default())
            .await
            .unwrap();
        let progress = Progress {
            errors: vec!["Error at offset 10: boom".into()],
            ..Progress::default()
        };

        let result = ctx.finish(SourceKind::Arxiv, progress, Ok(())).await;

        assert_eq!(result.errors.len(), 1);
        assert!(ctx.checkpoints.get(SourceKind::Arxiv).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_finish_records_abort_and_keeps_checkpoint_on_interrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ctx, _tx) = test_context(dir.path());
        ctx.checkpoints
            .save(SourceKind::Pubmed, "5", 5, Default::default())
            .await
            .unwrap();

        let aborted = ctx
            .finish(
                SourceKind::Pubmed,
                Progress::default(),
                Err(crate::domain::IngestError::Storage("disk full".into())),
            )
            .await;
        assert!(aborted.aborted);
        assert!(aborted.errors[0].contains("disk full"));

        let interrupted = ctx
            .finish(
                SourceKind::Pubmed,
                Progress {
                    interrupted: true,
                    ..Progress::default()
                },
                Ok(()),
            )
            .await;
        assert!(interrupted.interrupted);
        assert!(ctx.checkpoints.get(SourceKind::Pubmed).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resume_point_respects_flag() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut ctx, _tx) = test_context(dir.path());
        ctx.checkpoints
            .save(SourceKind::OpenAlex, "3", 400, Default::default())
            .await
            .unwrap();

        assert!(ctx.resume_point(SourceKind::OpenAlex).await.unwrap().is_some());
        ctx.resume = false;
        assert!(ctx.resume_point(SourceKind::OpenAlex).await.unwrap().is_none());
    }
}
