//! Ingestion results and run summary

use crate::adapters::http::TransportStats;
use crate::domain::SourceKind;
use serde::Serialize;
use std::time::Duration;

/// Outcome of one source's `ingest()`
#[derive(Debug, Clone, Serialize)]
pub struct SourceResult {
    pub source: SourceKind,

    /// Records staged by this run
    pub records_ingested: u64,

    /// Batch files written by this run
    pub batches: u64,

    /// Reference ids staged by this run (JSON source only)
    pub citations_count: u64,

    /// Page-level errors and, when the source aborted, the fatal one
    pub errors: Vec<String>,

    pub rate_limit_stats: Option<TransportStats>,

    /// Stopped by a shutdown request; the checkpoint was kept
    pub interrupted: bool,

    /// Stopped by a storage or checkpoint failure
    pub aborted: bool,
}

impl SourceResult {
    /// Result for a source that could not be started at all
    pub fn failed(source: SourceKind, message: impl Into<String>) -> Self {
        Self {
            source,
            records_ingested: 0,
            batches: 0,
            citations_count: 0,
            errors: vec![message.into()],
            rate_limit_stats: None,
            interrupted: false,
            aborted: true,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.errors.is_empty() && !self.interrupted
    }
}

/// Aggregated outcome of one orchestrated run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub results: Vec<SourceResult>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn new(results: Vec<SourceResult>) -> Self {
        Self {
            results,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn total_records(&self) -> u64 {
        self.results.iter().map(|r| r.records_ingested).sum()
    }

    pub fn total_batches(&self) -> u64 {
        self.results.iter().map(|r| r.batches).sum()
    }

    pub fn total_citations(&self) -> u64 {
        self.results.iter().map(|r| r.citations_count).sum()
    }

    /// Every error, tagged with its source
    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.errors.iter().map(move |e| format!("[{}] {e}", r.source)))
            .collect()
    }

    pub fn interrupted(&self) -> bool {
        self.results.iter().any(|r| r.interrupted)
    }

    /// No source reported an error
    pub fn is_successful(&self) -> bool {
        self.results.iter().all(|r| r.errors.is_empty())
    }

    /// Process exit status: 130 interrupted, 1 any error, 0 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.interrupted() {
            130
        } else if !self.is_successful() {
            1
        } else {
            0
        }
    }

    pub fn log_summary(&self) {
        for result in &self.results {
            tracing::info!(
                source = %result.source,
                records = result.records_ingested,
                batches = result.batches,
                citations = result.citations_count,
                errors = result.errors.len(),
                interrupted = result.interrupted,
                aborted = result.aborted,
                "Source finished"
            );
        }

        tracing::info!(
            sources = self.results.len(),
            total_records = self.total_records(),
            total_batches = self.total_batches(),
            duration_secs = self.duration.as_secs(),
            "Ingestion completed"
        );

        let errors = self.errors();
        if !errors.is_empty() {
            tracing::warn!(error_count = errors.len(), "Ingestion completed with errors");
            for error in &errors {
                tracing::warn!(message = %error, "Ingestion error");
            }
        }
    }
}
