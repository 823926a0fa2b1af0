//! Shared fetch loop
//!
//! Every source runs the same skeleton: fetch a page at a cursor position,
//! stage its records as one batch, checkpoint the next position, and stop at
//! the record ceiling, on an empty page or once the upstream total is
//! covered. Sources differ only in how a page is fetched ([`PageSource`])
//! and how the cursor moves ([`Pagination`]).
//!
//! Batch write always completes before the checkpoint that covers it is
//! saved, so a crash re-fetches at most one already staged batch.

use crate::adapters::http::RetryableTransport;
use crate::adapters::sources::AdapterContext;
use crate::core::state::Checkpoint;
use crate::domain::context::ResultExt;
use crate::domain::{BatchId, RawRecord, Result, SourceKind};
use crate::log_batch_written;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Consecutive failed pages after which a segment gives up
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// How the cursor advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Zero-based record offset, advanced by the entries a page returned
    Offset,
    /// One-based page number over fixed-size pages
    Numbered { per_page: u64 },
}

impl Pagination {
    pub fn first_position(self) -> u64 {
        match self {
            Pagination::Offset => 0,
            Pagination::Numbered { .. } => 1,
        }
    }

    pub fn after_page(self, position: u64, returned: u64) -> u64 {
        match self {
            Pagination::Offset => position + returned,
            Pagination::Numbered { .. } => position + 1,
        }
    }

    /// Position after a page that could not be fetched
    pub fn after_failure(self, position: u64, requested: u64) -> u64 {
        match self {
            Pagination::Offset => position + requested,
            Pagination::Numbered { .. } => position + 1,
        }
    }

    /// Upstream entries covered once the page at `position` returned `returned`
    pub fn covered(self, position: u64, returned: u64) -> u64 {
        match self {
            Pagination::Offset => position + returned,
            Pagination::Numbered { per_page } => {
                position.saturating_sub(1) * per_page + returned
            }
        }
    }

    fn describe(self, position: u64) -> String {
        match self {
            Pagination::Offset => format!("offset {position}"),
            Pagination::Numbered { .. } => format!("page {position}"),
        }
    }
}

/// One parsed upstream page
#[derive(Debug, Default)]
pub struct Page {
    /// Records with a native id; entries without one are already dropped
    pub records: Vec<RawRecord>,
    /// Entries upstream returned, dropped ones included
    pub returned: u64,
    /// Upstream total, when the response reports one
    pub total: Option<u64>,
}

impl Page {
    pub fn references(&self) -> u64 {
        self.records.iter().map(|r| r.references().len() as u64).sum()
    }
}

/// Protocol-specific page fetch
#[async_trait]
pub trait PageSource: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Fetches and parses up to `limit` entries at `position`
    ///
    /// Errors that are not fatal for the source are recorded by the loop,
    /// which then skips past the page.
    async fn fetch_page(
        &self,
        transport: &RetryableTransport,
        position: u64,
        limit: u64,
    ) -> Result<Page>;

    /// Metadata saved with each checkpoint
    fn checkpoint_metadata(&self, total: Option<u64>, _progress: &Progress) -> Map<String, Value> {
        let mut metadata = Map::new();
        if let Some(total) = total {
            metadata.insert("total_available".into(), Value::from(total));
        }
        metadata
    }
}

/// Run-wide counters shared by every segment of one source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    /// Records staged since the checkpoint was last cleared
    pub cumulative: u64,
    /// Records staged by this run
    pub ingested: u64,
    pub batches: u64,
    /// Reference ids staged by this run
    pub citations: u64,
    /// Reference ids staged by earlier runs
    pub prior_citations: u64,
    pub errors: Vec<String>,
    pub interrupted: bool,
}

impl Progress {
    /// Counters carried over from a checkpoint
    pub fn resumed(checkpoint: Option<&Checkpoint>) -> Self {
        match checkpoint {
            Some(cp) => Self {
                cumulative: cp.records_processed,
                prior_citations: cp.metadata_u64("citations_count").unwrap_or(0),
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    pub fn total_citations(&self) -> u64 {
        self.prior_citations + self.citations
    }
}

/// A bounded stretch of pagination over one query
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: u64,
    /// Records this segment already staged (non-zero when resuming inside it)
    pub staged: u64,
    /// Cap on records staged by this segment
    pub target: Option<u64>,
    /// Year bin start, for year-balanced feed queries
    pub year_bin: Option<i32>,
}

impl Segment {
    pub fn starting_at(start: u64) -> Self {
        Self {
            start,
            staged: 0,
            target: None,
            year_bin: None,
        }
    }
}

/// Why a segment stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    Ceiling,
    TargetReached,
    NoResults,
    TotalReached,
    TooManyFailures,
    Interrupted,
}

/// Drives a [`PageSource`] through one or more segments
pub struct FetchLoop<'a, S: PageSource + ?Sized> {
    ctx: &'a AdapterContext,
    pages: &'a S,
    pagination: Pagination,
    page_size: u64,
    max_records: u64,
    progress: &'a mut Progress,
}

impl<'a, S: PageSource + ?Sized> FetchLoop<'a, S> {
    pub fn new(
        ctx: &'a AdapterContext,
        pages: &'a S,
        pagination: Pagination,
        page_size: u64,
        max_records: u64,
        progress: &'a mut Progress,
    ) -> Self {
        Self {
            ctx,
            pages,
            pagination,
            page_size,
            max_records,
            progress,
        }
    }

    fn batch_id(&self, segment: &Segment, position: u64) -> BatchId {
        match (self.pagination, segment.year_bin) {
            (Pagination::Numbered { .. }, _) => BatchId::for_page(position),
            (Pagination::Offset, Some(year)) => BatchId::for_year_offset(year, position),
            (Pagination::Offset, None) => BatchId::for_offset(position),
        }
    }

    /// Runs one segment to its end
    ///
    /// # Errors
    ///
    /// Only errors fatal for the source (storage, checkpoint); every other
    /// failure is recorded in [`Progress::errors`] and the loop moves on.
    pub async fn run(&mut self, segment: Segment) -> Result<SegmentEnd> {
        let source = self.pages.source();
        let mut position = segment.start;
        let mut staged = segment.staged;
        let mut total: Option<u64> = None;
        let mut failures = 0;

        loop {
            if self.ctx.is_shutdown() {
                tracing::info!(source = %source, position, "Shutdown requested, stopping");
                self.progress.interrupted = true;
                return Ok(SegmentEnd::Interrupted);
            }
            if self.progress.cumulative >= self.max_records {
                tracing::info!(source = %source, max_records = self.max_records, "Reached max records");
                return Ok(SegmentEnd::Ceiling);
            }

            let mut limit = self.page_size.min(self.max_records - self.progress.cumulative);
            if let Some(target) = segment.target {
                if staged >= target {
                    return Ok(SegmentEnd::TargetReached);
                }
                limit = limit.min(target - staged);
            }

            tracing::debug!(source = %source, position, limit, "Fetching page");
            let page = match self
                .pages
                .fetch_page(&self.ctx.transport, position, limit)
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_fatal_for_source() => return Err(e),
                Err(e) => {
                    let message = format!("Error at {}: {e}", self.pagination.describe(position));
                    tracing::error!(source = %source, error = %e, position, "Page failed");
                    self.progress.errors.push(message);

                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        tracing::error!(source = %source, failures, "Too many consecutive failures");
                        return Ok(SegmentEnd::TooManyFailures);
                    }
                    position = self.pagination.after_failure(position, limit);
                    if total.is_some_and(|t| self.pagination.covered(position, 0) >= t) {
                        return Ok(SegmentEnd::TotalReached);
                    }
                    continue;
                }
            };
            failures = 0;

            if page.returned == 0 {
                tracing::info!(source = %source, position, "No more results");
                return Ok(SegmentEnd::NoResults);
            }
            if page.total.is_some() {
                total = page.total;
            }

            let next = self.pagination.after_page(position, page.returned);
            if !page.records.is_empty() {
                let batch_id = self.batch_id(&segment, position);
                let references = page.references();
                let written = self
                    .ctx
                    .writer
                    .write(source, &page.records, &batch_id, None)
                    .await
                    .with_context(|| format!("Staging {batch_id}"))? as u64;

                staged += written;
                self.progress.cumulative += written;
                self.progress.ingested += written;
                self.progress.batches += 1;
                self.progress.citations += references;

                let mut metadata = self.pages.checkpoint_metadata(total, &*self.progress);
                if let Some(year) = segment.year_bin {
                    metadata.insert("year_bin".into(), Value::from(year));
                    metadata.insert("bin_records".into(), Value::from(staged));
                }
                self.ctx
                    .checkpoints
                    .save(
                        source,
                        &next.to_string(),
                        self.progress.cumulative,
                        metadata,
                    )
                    .await
                    .with_context(|| format!("Checkpoint after {batch_id}"))?;

                log_batch_written!(source, batch_id, written, self.progress.cumulative);
            }

            let covered = self.pagination.covered(position, page.returned);
            position = next;
            if total.is_some_and(|t| covered >= t) {
                tracing::info!(source = %source, covered, "Fetched all available records");
                return Ok(SegmentEnd::TotalReached);
            }
        }
    }
}
