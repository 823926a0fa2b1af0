//! OpenAlex works adapter
//!
//! Single-phase numbered pages filtered by a comma-joined filter string.
//! Works carry their reference lists inline, so this is the only source
//! that stages citation edges.

use crate::adapters::http::RetryableTransport;
use crate::adapters::sources::pagination::{FetchLoop, Page, PageSource, Pagination, Progress, Segment};
use crate::adapters::sources::{AdapterContext, SourceAdapter};
use crate::config::{OpenAlexConfig, OpenAlexFilters};
use crate::core::ingest::SourceResult;
use crate::core::state::Checkpoint;
use crate::domain::{
    Concept, IngestError, OpenAlexAuthor, OpenAlexRecord, RawRecord, Result, SourceKind, Venue,
};
use crate::log_skipped_record;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const OPENALEX_PREFIX: &str = "https://openalex.org/";

/// Fields requested with `select`
pub const SELECT_FIELDS: &str = "id,doi,title,display_name,publication_year,publication_date,type,\
cited_by_count,authorships,concepts,primary_location,referenced_works,related_works,open_access,\
abstract_inverted_index,cited_by_api_url";

/// Filter string from the configured facets, clauses comma-joined
///
/// # Examples
///
/// ```
/// use scholarly_ingest::adapters::sources::paged_json::build_filter;
/// use scholarly_ingest::config::OpenAlexFilters;
///
/// let filters = OpenAlexFilters {
///     concepts: vec!["C41008148".into(), "C154945302".into()],
///     has_doi: true,
///     ..OpenAlexFilters::default()
/// };
/// assert_eq!(build_filter(&filters), "concepts.id:C41008148|C154945302,has_doi:true");
/// ```
pub fn build_filter(filters: &OpenAlexFilters) -> String {
    let mut parts = Vec::new();
    if !filters.concepts.is_empty() {
        parts.push(format!("concepts.id:{}", filters.concepts.join("|")));
    }
    if let Some(from) = &filters.from_publication_date {
        parts.push(format!("from_publication_date:{from}"));
    }
    if let Some(to) = &filters.to_publication_date {
        parts.push(format!("to_publication_date:{to}"));
    }
    if filters.has_doi {
        parts.push("has_doi:true".to_string());
    }
    if let Some(min) = filters.cited_by_count_min.filter(|m| *m > 0) {
        parts.push(format!("cited_by_count:>{min}"));
    }
    parts.join(",")
}

/// Rebuilds abstract text from `word -> positions`
pub fn reconstruct_abstract(index: &BTreeMap<String, Vec<u64>>) -> Option<String> {
    let mut words: Vec<(u64, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
        .collect();
    if words.is_empty() {
        return None;
    }
    words.sort_by_key(|(position, _)| *position);
    Some(
        words
            .into_iter()
            .map(|(_, word)| word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn strip_prefix(id: &str) -> String {
    id.replace(OPENALEX_PREFIX, "")
}

#[derive(Debug, Default, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i64>,
    publication_date: Option<String>,
    #[serde(rename = "type")]
    work_type: Option<String>,
    cited_by_count: Option<i64>,
    authorships: Option<Vec<Authorship>>,
    concepts: Option<Vec<WorkConcept>>,
    primary_location: Option<Location>,
    referenced_works: Option<Vec<String>>,
    related_works: Option<Vec<String>>,
    open_access: Option<OpenAccess>,
    #[serde(default, deserialize_with = "lenient_inverted_index")]
    abstract_inverted_index: Option<BTreeMap<String, Vec<u64>>>,
    cited_by_api_url: Option<String>,
}

/// A malformed index costs the work its abstract, not the whole work
fn lenient_inverted_index<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<BTreeMap<String, Vec<u64>>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match serde_json::from_value(v) {
        Ok(index) => Some(index),
        Err(e) => {
            tracing::warn!(
                source = %SourceKind::OpenAlex,
                error = %e,
                "Ignoring malformed abstract_inverted_index"
            );
            None
        }
    }))
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<AuthorRef>,
    author_position: Option<String>,
    institutions: Option<Vec<Institution>>,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    id: Option<String>,
    display_name: Option<String>,
    orcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Institution {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkConcept {
    id: Option<String>,
    display_name: Option<String>,
    level: Option<i64>,
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Location {
    source: Option<LocationSource>,
}

#[derive(Debug, Deserialize)]
struct LocationSource {
    id: Option<String>,
    display_name: Option<String>,
    #[serde(rename = "type")]
    source_type: Option<String>,
    issn_l: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccess {
    is_oa: Option<bool>,
    oa_status: Option<String>,
    oa_url: Option<String>,
}

impl Work {
    fn into_record(self) -> Option<OpenAlexRecord> {
        let openalex_id = self.id.as_deref().map(strip_prefix).filter(|id| !id.is_empty())?;

        let authors = self
            .authorships
            .unwrap_or_default()
            .into_iter()
            .map(|authorship| {
                let author = authorship.author;
                OpenAlexAuthor {
                    openalex_id: author
                        .as_ref()
                        .and_then(|a| a.id.as_deref())
                        .map(strip_prefix),
                    name: author.as_ref().and_then(|a| a.display_name.clone()),
                    orcid: author.as_ref().and_then(|a| a.orcid.clone()),
                    position: authorship.author_position,
                    affiliations: authorship
                        .institutions
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|i| i.display_name)
                        .collect(),
                }
            })
            .collect();

        let concepts = self
            .concepts
            .unwrap_or_default()
            .into_iter()
            .map(|c| Concept {
                id: c.id.as_deref().map(strip_prefix),
                name: c.display_name,
                level: c.level,
                score: c.score,
            })
            .collect();

        let venue = self
            .primary_location
            .and_then(|location| location.source)
            .map(|source| Venue {
                id: source.id.as_deref().map(strip_prefix),
                name: source.display_name,
                venue_type: source.source_type,
                issn: source.issn_l,
            });

        let strip_all = |ids: Option<Vec<String>>| -> Vec<String> {
            ids.unwrap_or_default().iter().map(|id| strip_prefix(id)).collect()
        };
        let open_access = self.open_access;

        Some(OpenAlexRecord {
            openalex_id,
            doi: self.doi,
            title: self.title.or(self.display_name),
            publication_year: self.publication_year,
            publication_date: self.publication_date,
            work_type: self.work_type,
            cited_by_count: self.cited_by_count.unwrap_or(0),
            authors,
            concepts,
            venue,
            referenced_works: strip_all(self.referenced_works),
            related_works: strip_all(self.related_works),
            abstract_text: self
                .abstract_inverted_index
                .as_ref()
                .and_then(reconstruct_abstract),
            is_oa: open_access.as_ref().and_then(|oa| oa.is_oa).unwrap_or(false),
            oa_status: open_access.as_ref().and_then(|oa| oa.oa_status.clone()),
            oa_url: open_access.and_then(|oa| oa.oa_url),
            cited_by_api_url: self.cited_by_api_url,
        })
    }
}

/// Parses one works page into records, the result count and `meta.count`
pub fn parse_works(body: &str) -> Result<(Vec<OpenAlexRecord>, u64, Option<u64>)> {
    let response: WorksResponse = serde_json::from_str(body)
        .map_err(|e| IngestError::Parse(format!("Invalid works response: {e}")))?;

    let returned = response.results.len() as u64;
    let mut records = Vec::with_capacity(response.results.len());
    for value in response.results {
        match serde_json::from_value::<Work>(value) {
            Ok(work) => match work.into_record() {
                Some(record) => records.push(record),
                None => log_skipped_record!(SourceKind::OpenAlex, "work without an id"),
            },
            Err(e) => log_skipped_record!(SourceKind::OpenAlex, format!("malformed work: {e}")),
        }
    }
    Ok((records, returned, response.meta.count))
}

/// OpenAlex ingestion
pub struct PagedJsonAdapter {
    config: OpenAlexConfig,
    ctx: AdapterContext,
    filter: String,
}

impl PagedJsonAdapter {
    pub fn new(config: OpenAlexConfig, ctx: AdapterContext) -> Self {
        let filter = build_filter(&config.filters);
        Self {
            config,
            ctx,
            filter,
        }
    }

    async fn run(&self, progress: &mut Progress) -> Result<()> {
        let checkpoint = self.ctx.resume_point(SourceKind::OpenAlex).await?;
        *progress = Progress::resumed(checkpoint.as_ref());

        let per_page = self.config.effective_per_page();
        let pagination = Pagination::Numbered { per_page };
        let start = checkpoint
            .as_ref()
            .and_then(Checkpoint::cursor_position)
            .filter(|page| *page >= 1)
            .unwrap_or_else(|| pagination.first_position());

        tracing::info!(
            filter = %self.filter,
            per_page,
            max_records = self.config.max_records,
            "Starting OpenAlex ingestion"
        );
        FetchLoop::new(
            &self.ctx,
            self,
            pagination,
            per_page,
            self.config.max_records,
            progress,
        )
        .run(Segment::starting_at(start))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PageSource for PagedJsonAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::OpenAlex
    }

    async fn fetch_page(
        &self,
        transport: &RetryableTransport,
        position: u64,
        limit: u64,
    ) -> Result<Page> {
        let mut params = Vec::with_capacity(5);
        if !self.filter.is_empty() {
            params.push(("filter", self.filter.clone()));
        }
        // The upstream slices pages as (page - 1) * per-page, so the page
        // size stays fixed and a short final page is trimmed locally.
        params.push(("page", position.to_string()));
        params.push(("per-page", self.config.effective_per_page().to_string()));
        params.push(("mailto", self.config.email.clone()));
        params.push(("select", SELECT_FIELDS.to_string()));

        let response = transport.get(&self.config.base_url, &params).await?;
        let (mut records, returned, total) = parse_works(&response.body)?;
        records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(Page {
            records: records.into_iter().map(RawRecord::from).collect(),
            returned,
            total,
        })
    }

    fn checkpoint_metadata(&self, total: Option<u64>, progress: &Progress) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("total_results".into(), total.map(Value::from).unwrap_or(Value::Null));
        metadata.insert(
            "citations_count".into(),
            Value::from(progress.total_citations()),
        );
        metadata
    }
}

#[async_trait]
impl SourceAdapter for PagedJsonAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::OpenAlex
    }

    async fn ingest(&self) -> SourceResult {
        let mut progress = Progress::default();
        let outcome = self.run(&mut progress).await;
        self.ctx.finish(SourceKind::OpenAlex, progress, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::transport::tests::ScriptedBackend;
    use crate::adapters::http::{HttpBackend, HttpResponse};
    use crate::adapters::sources::tests::test_context_with;
    use crate::core::storage::PartitionedWriter;
    use crate::domain::UpstreamError;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Serves a fixed corpus the way the works API slices it
    struct CorpusBackend {
        size: u64,
        requests: Mutex<Vec<(u64, u64)>>,
    }

    impl CorpusBackend {
        fn new(size: u64) -> Arc<Self> {
            Arc::new(Self {
                size,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(u64, u64)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpBackend for CorpusBackend {
        async fn get(
            &self,
            _url: &str,
            query: &[(&str, String)],
        ) -> std::result::Result<HttpResponse, UpstreamError> {
            let param = |name: &str| -> u64 {
                query
                    .iter()
                    .find(|(k, _)| *k == name)
                    .and_then(|(_, v)| v.parse().ok())
                    .unwrap()
            };
            let (page_no, per_page) = (param("page"), param("per-page"));
            self.requests.lock().unwrap().push((page_no, per_page));

            let start = ((page_no - 1) * per_page).min(self.size);
            let end = (start + per_page).min(self.size);
            let works = (start..end).map(|n| work(&format!("W{n}"), &[])).collect();
            Ok(HttpResponse::ok(page(works, self.size)))
        }
    }

    fn work(id: &str, refs: &[&str]) -> Value {
        json!({
            "id": format!("https://openalex.org/{id}"),
            "title": format!("Work {id}"),
            "referenced_works": refs.iter().map(|r| format!("https://openalex.org/{r}")).collect::<Vec<_>>(),
        })
    }

    fn page(works: Vec<Value>, count: u64) -> String {
        json!({ "meta": { "count": count }, "results": works }).to_string()
    }

    #[test]
    fn test_reconstruct_abstract() {
        let index: BTreeMap<String, Vec<u64>> =
            serde_json::from_str(r#"{"a":[0,2],"b":[1]}"#).unwrap();
        assert_eq!(reconstruct_abstract(&index).as_deref(), Some("a b a"));
        assert_eq!(reconstruct_abstract(&BTreeMap::new()), None);
    }

    #[test]
    fn test_build_filter_all_facets() {
        let filters = OpenAlexFilters {
            concepts: vec!["C41008148".into(), "C119857082".into()],
            from_publication_date: Some("2020-01-01".into()),
            to_publication_date: Some("2024-12-31".into()),
            has_doi: true,
            cited_by_count_min: Some(10),
        };
        assert_eq!(
            build_filter(&filters),
            "concepts.id:C41008148|C119857082,from_publication_date:2020-01-01,\
             to_publication_date:2024-12-31,has_doi:true,cited_by_count:>10"
        );
        assert_eq!(build_filter(&OpenAlexFilters::default()), "");
    }

    #[test]
    fn test_parse_full_work() {
        let body = page(
            vec![json!({
                "id": "https://openalex.org/W2741809807",
                "doi": "https://doi.org/10.7717/peerj.4375",
                "title": null,
                "display_name": "The state of OA",
                "publication_year": 2018,
                "publication_date": "2018-02-13",
                "type": "article",
                "cited_by_count": 812,
                "authorships": [{
                    "author_position": "first",
                    "author": {
                        "id": "https://openalex.org/A5023888391",
                        "display_name": "Heather Piwowar",
                        "orcid": "https://orcid.org/0000-0003-1613-5981"
                    },
                    "institutions": [{"display_name": "Impactstory"}, {"display_name": null}]
                }],
                "concepts": [{
                    "id": "https://openalex.org/C41008148",
                    "display_name": "Computer science",
                    "level": 0,
                    "score": 0.62
                }],
                "primary_location": {
                    "source": {
                        "id": "https://openalex.org/S1983995261",
                        "display_name": "PeerJ",
                        "type": "journal",
                        "issn_l": "2167-8359"
                    }
                },
                "referenced_works": ["https://openalex.org/W1", "https://openalex.org/W2"],
                "related_works": ["https://openalex.org/W3"],
                "open_access": {"is_oa": true, "oa_status": "gold", "oa_url": "https://peerj.com/4375"},
                "abstract_inverted_index": {"Open": [0], "access": [1], "matters": [2]},
                "cited_by_api_url": "https://api.openalex.org/works?filter=cites:W2741809807"
            })],
            1,
        );

        let (records, returned, total) = parse_works(&body).unwrap();
        assert_eq!((returned, total), (1, Some(1)));

        let r = &records[0];
        assert_eq!(r.openalex_id, "W2741809807");
        assert_eq!(r.title.as_deref(), Some("The state of OA"));
        assert_eq!(r.cited_by_count, 812);
        assert_eq!(r.authors[0].openalex_id.as_deref(), Some("A5023888391"));
        assert_eq!(r.authors[0].position.as_deref(), Some("first"));
        assert_eq!(r.authors[0].affiliations, vec!["Impactstory"]);
        assert_eq!(r.concepts[0].id.as_deref(), Some("C41008148"));
        let venue = r.venue.as_ref().unwrap();
        assert_eq!(venue.id.as_deref(), Some("S1983995261"));
        assert_eq!(venue.issn.as_deref(), Some("2167-8359"));
        assert_eq!(r.referenced_works, vec!["W1", "W2"]);
        assert_eq!(r.related_works, vec!["W3"]);
        assert_eq!(r.abstract_text.as_deref(), Some("Open access matters"));
        assert!(r.is_oa);
        assert_eq!(r.oa_status.as_deref(), Some("gold"));
    }

    #[test]
    fn test_parse_skips_works_without_id_and_malformed_works() {
        let body = page(
            vec![
                json!({"title": "no id"}),
                json!({"id": "https://openalex.org/W9", "cited_by_count": "many"}),
                work("W10", &[]),
            ],
            3,
        );
        let (records, returned, _) = parse_works(&body).unwrap();
        assert_eq!(returned, 3);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].openalex_id, "W10");
        assert!(!records[0].is_oa);
        assert!(records[0].venue.is_none());
    }

    #[test]
    fn test_malformed_inverted_index_keeps_work() {
        let body = page(
            vec![
                json!({"id": "https://openalex.org/W1", "abstract_inverted_index": {"a": ["x"]}}),
                json!({"id": "https://openalex.org/W2", "abstract_inverted_index": {"a": [-1, 0.5]}}),
                json!({"id": "https://openalex.org/W3", "abstract_inverted_index": "oops"}),
                json!({"id": "https://openalex.org/W4", "abstract_inverted_index": null}),
            ],
            4,
        );
        let (records, returned, _) = parse_works(&body).unwrap();
        assert_eq!(returned, 4);
        let ids: Vec<_> = records.iter().map(|r| r.openalex_id.as_str()).collect();
        assert_eq!(ids, vec!["W1", "W2", "W3", "W4"]);
        assert!(records.iter().all(|r| r.abstract_text.is_none()));
    }

    #[tokio::test]
    async fn test_last_page_keeps_page_size_and_trims_locally() {
        let dir = TempDir::new().unwrap();
        let backend = CorpusBackend::new(10);
        let (ctx, _tx) = test_context_with(dir.path(), backend.clone());
        let config = OpenAlexConfig {
            enabled: true,
            per_page: 2,
            max_records: 5,
            ..OpenAlexConfig::default()
        };

        let result = PagedJsonAdapter::new(config, ctx.clone()).ingest().await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.records_ingested, 5);
        assert_eq!(backend.requests(), vec![(1, 2), (2, 2), (3, 2)]);

        let mut ids = Vec::new();
        for file in ctx.writer.list(SourceKind::OpenAlex, None).unwrap() {
            for record in PartitionedWriter::read(&file).unwrap() {
                ids.push(record.unwrap()["openalex_id"].as_str().unwrap().to_string());
            }
        }
        ids.sort();
        assert_eq!(ids, vec!["W0", "W1", "W2", "W3", "W4"]);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_works("<html>502 Bad Gateway</html>").is_err());
    }

    #[tokio::test]
    async fn test_ingest_stops_when_count_is_covered() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new(vec![
            Ok(HttpResponse::ok(page(vec![work("W1", &["W7"]), work("W2", &["W7", "W8"])], 3))),
            Ok(HttpResponse::ok(page(vec![work("W3", &[])], 3))),
        ]);
        let (ctx, _tx) = test_context_with(dir.path(), backend.clone());
        let config = OpenAlexConfig {
            enabled: true,
            per_page: 2,
            ..OpenAlexConfig::default()
        };

        let result = PagedJsonAdapter::new(config, ctx.clone()).ingest().await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.records_ingested, 3);
        assert_eq!(result.batches, 2);
        assert_eq!(result.citations_count, 3);
        assert_eq!(backend.calls(), 2);

        let mut names: Vec<_> = ctx
            .writer
            .list(SourceKind::OpenAlex, None)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["page_000001.ndjson", "page_000002.ndjson"]);
    }

    #[tokio::test]
    async fn test_failed_page_keeps_checkpoint() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new(vec![
            Ok(HttpResponse::ok(page(vec![work("W1", &["W5"]), work("W2", &[])], 3))),
            Ok(HttpResponse::with_status(403, "forbidden")),
        ]);
        let (ctx, _tx) = test_context_with(dir.path(), backend.clone());
        let config = OpenAlexConfig {
            enabled: true,
            per_page: 2,
            ..OpenAlexConfig::default()
        };

        let result = PagedJsonAdapter::new(config, ctx.clone()).ingest().await;

        assert_eq!(result.records_ingested, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("page 2"));
        // page 3 would start past meta.count
        assert_eq!(backend.calls(), 2);

        let checkpoint = ctx.checkpoints.get(SourceKind::OpenAlex).await.unwrap().unwrap();
        assert_eq!(checkpoint.cursor, "2");
        assert_eq!(checkpoint.metadata_u64("total_results"), Some(3));
        assert_eq!(checkpoint.metadata_u64("citations_count"), Some(1));
    }
}
