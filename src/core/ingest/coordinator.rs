//! Orchestrator - runs every enabled source and aggregates the outcome
//!
//! All sources share one checkpoint store and one partitioned writer. Each
//! gets its own transport and rate limiter, since upstream quotas are
//! independent. Sources write disjoint partitions and checkpoint keys, so
//! running them concurrently needs no coordination.

use crate::adapters::http::{
    HttpBackend, RateLimiter, ReqwestBackend, RetryPolicy, RetryableTransport,
};
use crate::adapters::sources::{
    AdapterContext, FeedAdapter, PagedJsonAdapter, SourceAdapter, TwoPhaseAdapter,
};
use crate::config::{
    ArxivConfig, IngestConfig, OpenAlexConfig, RateLimitConfig,
};
use crate::core::ingest::summary::{RunSummary, SourceResult};
use crate::core::state::{CheckpointStore, FileCheckpointStore};
use crate::core::storage::PartitionedWriter;
use crate::domain::{Result, SourceKind};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Builds adapters from configuration and drives them
pub struct Orchestrator {
    config: IngestConfig,
    checkpoints: Arc<dyn CheckpointStore>,
    writer: PartitionedWriter,
    shutdown: watch::Receiver<bool>,
    resume: bool,
    backend: Option<Arc<dyn HttpBackend>>,
}

impl Orchestrator {
    /// Creates the shared checkpoint store and writer from `[global]`
    ///
    /// # Errors
    ///
    /// Fails when the checkpoint or staging directory cannot be created.
    pub fn new(config: IngestConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let checkpoints = Arc::new(FileCheckpointStore::new(&config.global.checkpoint_dir)?);
        let writer = PartitionedWriter::new(&config.global.raw_data_dir, config.global.compress)?
            .with_flush_interval(config.global.flush_interval);
        let resume = config.global.resume;

        Ok(Self {
            config,
            checkpoints,
            writer,
            shutdown,
            resume,
            backend: None,
        })
    }

    /// Replaces the checkpoint store shared by all sources
    pub fn with_checkpoint_store(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Sends every request through `backend` instead of a reqwest client
    pub fn with_backend(mut self, backend: Arc<dyn HttpBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn sources(&self) -> Vec<SourceKind> {
        self.config.enabled_sources()
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Clears the checkpoints of every enabled source
    pub async fn clear_checkpoints(&self) -> Result<()> {
        for source in self.sources() {
            self.checkpoints.clear(source).await?;
            tracing::info!(source = %source, "Checkpoint cleared");
        }
        Ok(())
    }

    fn rate_limit(&self, source: SourceKind) -> (&RateLimitConfig, f64) {
        match source {
            SourceKind::Arxiv => (&self.config.arxiv.rate_limit, ArxivConfig::DEFAULT_RPS),
            SourceKind::Pubmed => (
                &self.config.pubmed.rate_limit,
                self.config.pubmed.default_rps(),
            ),
            SourceKind::OpenAlex => (
                &self.config.openalex.rate_limit,
                OpenAlexConfig::DEFAULT_RPS,
            ),
        }
    }

    /// Transport with a dedicated rate limiter for `source`
    pub fn transport(&self, source: SourceKind) -> Result<RetryableTransport> {
        let (limits, default_rps) = self.rate_limit(source);
        let rps = limits.rate_or(default_rps);

        let backend: Arc<dyn HttpBackend> = match &self.backend {
            Some(backend) => backend.clone(),
            None => Arc::new(ReqwestBackend::new(Duration::from_secs(
                self.config.global.request_timeout_secs,
            ))?),
        };
        let policy = RetryPolicy {
            max_attempts: limits.retry_attempts,
            backoff_factor: limits.retry_backoff_factor,
            max_rate_limit_waits: limits.max_rate_limit_waits,
        };

        tracing::debug!(
            source = %source,
            requests_per_second = rps,
            burst_size = limits.burst_size,
            retry_attempts = limits.retry_attempts,
            "Configured transport"
        );
        Ok(RetryableTransport::new(
            backend,
            Arc::new(RateLimiter::new(rps, limits.burst_size)),
            policy,
        )
        .with_default_retry_after(Duration::from_secs(limits.default_retry_after_secs)))
    }

    fn adapter(&self, source: SourceKind) -> Result<Box<dyn SourceAdapter>> {
        let ctx = AdapterContext {
            checkpoints: self.checkpoints.clone(),
            writer: self.writer.clone(),
            transport: Arc::new(self.transport(source)?),
            shutdown: self.shutdown.clone(),
            resume: self.resume,
        };
        Ok(match source {
            SourceKind::Arxiv => Box::new(FeedAdapter::new(self.config.arxiv.clone(), ctx)),
            SourceKind::Pubmed => Box::new(TwoPhaseAdapter::new(self.config.pubmed.clone(), ctx)),
            SourceKind::OpenAlex => {
                Box::new(PagedJsonAdapter::new(self.config.openalex.clone(), ctx))
            }
        })
    }

    /// Runs every enabled source to completion
    ///
    /// A source that fails never stops the others; its errors end up in
    /// the summary.
    pub async fn run(&self) -> RunSummary {
        let start = Instant::now();
        let sources = self.sources();
        tracing::info!(
            sources = ?sources,
            concurrent = self.config.global.concurrent_sources,
            resume = self.resume,
            "Starting ingestion run"
        );

        let mut results = Vec::with_capacity(sources.len());
        let mut adapters = Vec::with_capacity(sources.len());
        for source in sources {
            match self.adapter(source) {
                Ok(adapter) => adapters.push(adapter),
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Failed to start source");
                    results.push(SourceResult::failed(source, format!("Failed to start: {e}")));
                }
            }
        }

        if self.config.global.concurrent_sources {
            results.extend(join_all(adapters.iter().map(|a| a.ingest())).await);
        } else {
            for adapter in &adapters {
                results.push(adapter.ingest().await);
            }
        }
        results.sort_by_key(|r| r.source);

        let summary = RunSummary::new(results).with_duration(start.elapsed());
        summary.log_summary();
        summary
    }
}
