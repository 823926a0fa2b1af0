//! arXiv Atom feed adapter
//!
//! Queries are a disjunction of category codes (`cat:cs.AI OR cat:cs.LG`)
//! paged by offset. With year balancing enabled the adapter runs one
//! segment per configured year bin, appending a `submittedDate` range to
//! the base query; bins share the running total and the record ceiling.

use crate::adapters::http::RetryableTransport;
use crate::adapters::sources::pagination::{
    FetchLoop, Page, PageSource, Pagination, Progress, Segment, SegmentEnd,
};
use crate::adapters::sources::xml::{self, Element};
use crate::adapters::sources::{AdapterContext, SourceAdapter};
use crate::config::{ArxivConfig, YearBin};
use crate::core::ingest::SourceResult;
use crate::core::state::Checkpoint;
use crate::domain::{ArxivRecord, Author, IngestError, Link, RawRecord, Result, SourceKind};
use crate::log_skipped_record;
use async_trait::async_trait;

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const ARXIV_NS: &str = "http://arxiv.org/schemas/atom";
pub const OPENSEARCH_NS: &str = "http://a9.com/-/spec/opensearch/1.1/";

/// `cat:X OR cat:Y ...`
pub fn category_query(categories: &[String]) -> String {
    categories
        .iter()
        .map(|c| format!("cat:{}", c.trim()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Restricts `base` to submissions inside `bin`
pub fn year_clause(base: &str, bin: &YearBin) -> String {
    format!(
        "({base}) AND submittedDate:[{}01010000 TO {}12312359]",
        bin.start, bin.end
    )
}

/// Per-bin record targets: `floor(weight * max_records)`, at least `min_per_bin`
///
/// Weights are normalized by their sum first.
///
/// # Examples
///
/// ```
/// use scholarly_ingest::adapters::sources::feed::allocate_targets;
///
/// let targets = allocate_targets(1000, &[0.15, 0.20, 0.25, 0.40], 20);
/// assert_eq!(targets, vec![150, 200, 250, 400]);
/// ```
pub fn allocate_targets(max_records: u64, weights: &[f64], min_per_bin: u64) -> Vec<u64> {
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return vec![min_per_bin; weights.len()];
    }
    weights
        .iter()
        .map(|w| {
            // epsilon keeps 0.15 * 1000 from flooring to 149
            let share = (w / sum * max_records as f64 + 1e-9).floor() as u64;
            share.max(min_per_bin)
        })
        .collect()
}

/// Stable id from an entry URL: everything after `abs/`
pub fn extract_arxiv_id(entry_id: &str) -> Option<String> {
    entry_id
        .split_once("abs/")
        .map(|(_, id)| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Parses one Atom response into records, the entry count and the total
pub fn parse_feed(body: &str) -> Result<(Vec<ArxivRecord>, u64, Option<u64>)> {
    let root = xml::parse(body)?;
    if !root.is(ATOM_NS, "feed") {
        return Err(IngestError::Parse(format!(
            "Expected an Atom feed, found <{}>",
            root.name()
        )));
    }

    let total = root
        .child_text(OPENSEARCH_NS, "totalResults")
        .and_then(|t| t.parse().ok());

    let mut records = Vec::new();
    let mut returned = 0;
    for entry in root.children_named(ATOM_NS, "entry") {
        returned += 1;
        match parse_entry(entry) {
            Some(record) => records.push(record),
            None => log_skipped_record!(SourceKind::Arxiv, "entry without an abs/ id"),
        }
    }
    Ok((records, returned, total))
}

fn parse_entry(entry: &Element) -> Option<ArxivRecord> {
    let arxiv_id = entry
        .child_text(ATOM_NS, "id")
        .and_then(|id| extract_arxiv_id(&id))?;

    let authors = entry
        .children_named(ATOM_NS, "author")
        .filter_map(|author| {
            Some(Author {
                name: author.child_text(ATOM_NS, "name")?,
                affiliation: author.child_text(ARXIV_NS, "affiliation"),
            })
        })
        .collect();

    let categories = entry
        .children_named(ATOM_NS, "category")
        .filter_map(|c| c.attr("term").map(str::to_string))
        .collect();

    let links = entry
        .children_named(ATOM_NS, "link")
        .map(|link| Link {
            href: link.attr("href").map(str::to_string),
            link_type: link.attr("type").map(str::to_string),
            rel: link.attr("rel").unwrap_or("alternate").to_string(),
        })
        .collect();

    Some(ArxivRecord {
        arxiv_id,
        title: entry.child_text(ATOM_NS, "title"),
        abstract_text: entry.child_text(ATOM_NS, "summary"),
        authors,
        categories,
        primary_category: entry
            .child(ARXIV_NS, "primary_category")
            .and_then(|c| c.attr("term"))
            .map(str::to_string),
        published: entry.child_text(ATOM_NS, "published"),
        updated: entry.child_text(ATOM_NS, "updated"),
        doi: entry.child_text(ARXIV_NS, "doi"),
        journal_ref: entry.child_text(ARXIV_NS, "journal_ref"),
        comment: entry.child_text(ARXIV_NS, "comment"),
        links,
    })
}

/// arXiv ingestion
pub struct FeedAdapter {
    config: ArxivConfig,
    ctx: AdapterContext,
}

/// One search query against the feed
struct FeedQuery<'a> {
    base_url: &'a str,
    query: String,
}

#[async_trait]
impl PageSource for FeedQuery<'_> {
    fn source(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    async fn fetch_page(
        &self,
        transport: &RetryableTransport,
        position: u64,
        limit: u64,
    ) -> Result<Page> {
        let params = [
            ("search_query", self.query.clone()),
            ("start", position.to_string()),
            ("max_results", limit.to_string()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];
        let response = transport.get(self.base_url, &params).await?;
        let (records, returned, total) = parse_feed(&response.body)?;
        Ok(Page {
            records: records.into_iter().map(RawRecord::from).collect(),
            returned,
            total,
        })
    }
}

impl FeedAdapter {
    pub fn new(config: ArxivConfig, ctx: AdapterContext) -> Self {
        Self { config, ctx }
    }

    /// Year bins paired with their record targets
    pub fn year_plan(&self) -> Vec<(YearBin, u64)> {
        let balance = &self.config.year_balance;
        let targets = allocate_targets(
            self.config.max_records,
            &balance.weights,
            balance.min_per_bin,
        );
        balance.bins.iter().cloned().zip(targets).collect()
    }

    async fn run(&self, progress: &mut Progress) -> Result<()> {
        let checkpoint = self.ctx.resume_point(SourceKind::Arxiv).await?;
        *progress = Progress::resumed(checkpoint.as_ref());

        let base = category_query(&self.config.categories);
        tracing::info!(query = %base, max_records = self.config.max_records, "Starting arXiv ingestion");

        if !self.config.year_balance.enabled {
            let start = checkpoint
                .as_ref()
                .and_then(Checkpoint::cursor_position)
                .unwrap_or(0);
            let query = FeedQuery {
                base_url: &self.config.base_url,
                query: base,
            };
            self.fetch(&query, progress, Segment::starting_at(start))
                .await?;
            return Ok(());
        }

        let plan = self.year_plan();
        let resume_bin = checkpoint.as_ref().and_then(|cp| {
            let year = cp.metadata_u64("year_bin")?;
            Some((
                year as i32,
                cp.cursor_position().unwrap_or(0),
                cp.metadata_u64("bin_records").unwrap_or(0),
            ))
        });
        let first = resume_bin
            .and_then(|(year, _, _)| plan.iter().position(|(bin, _)| bin.start == year))
            .unwrap_or(0);

        for (index, (bin, target)) in plan.iter().enumerate().skip(first) {
            let mut segment = Segment {
                start: 0,
                staged: 0,
                target: Some(*target),
                year_bin: Some(bin.start),
            };
            if let Some((year, cursor, staged)) = resume_bin {
                if index == first && year == bin.start {
                    segment.start = cursor;
                    segment.staged = staged;
                }
            }

            tracing::info!(
                year_start = bin.start,
                year_end = bin.end,
                bin_target = *target,
                "Fetching year bin"
            );
            let query = FeedQuery {
                base_url: &self.config.base_url,
                query: year_clause(&base, bin),
            };
            let end = self.fetch(&query, progress, segment).await?;
            if matches!(end, SegmentEnd::Ceiling | SegmentEnd::Interrupted) {
                break;
            }
        }
        Ok(())
    }

    async fn fetch(
        &self,
        query: &FeedQuery<'_>,
        progress: &mut Progress,
        segment: Segment,
    ) -> Result<SegmentEnd> {
        FetchLoop::new(
            &self.ctx,
            query,
            Pagination::Offset,
            self.config.batch_size,
            self.config.max_records,
            progress,
        )
        .run(segment)
        .await
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    async fn ingest(&self) -> SourceResult {
        let mut progress = Progress::default();
        let outcome = self.run(&mut progress).await;
        self.ctx.finish(SourceKind::Arxiv, progress, outcome).await
    }
}
