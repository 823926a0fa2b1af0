//! PubMed E-utilities adapter
//!
//! Each page takes two requests: ESearch returns a window of PMIDs plus the
//! total hit count, then EFetch returns the full articles for exactly those
//! ids. The offset cursor advances by the number of ids searched.

use crate::adapters::http::RetryableTransport;
use crate::adapters::sources::pagination::{FetchLoop, Page, PageSource, Pagination, Progress, Segment};
use crate::adapters::sources::xml::{self, Element, NO_NS};
use crate::adapters::sources::{AdapterContext, SourceAdapter};
use crate::config::PubmedConfig;
use crate::core::ingest::SourceResult;
use crate::core::state::Checkpoint;
use crate::domain::{Author, IngestError, MeshTerm, PubmedRecord, RawRecord, Result, SourceKind};
use crate::log_skipped_record;
use async_trait::async_trait;
use secrecy::ExposeSecret;

/// `"term"[Title/Abstract]` clauses joined with `OR`
pub fn search_term(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\"[Title/Abstract]"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// One ESearch window
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub ids: Vec<String>,
    pub total: u64,
}

pub fn parse_search(body: &str) -> Result<SearchPage> {
    let root = xml::parse(body)?;
    if !root.is(NO_NS, "eSearchResult") {
        return Err(IngestError::Parse(format!(
            "Expected eSearchResult, found <{}>",
            root.name()
        )));
    }
    if let Some(error) = root.child_text(NO_NS, "ERROR") {
        return Err(IngestError::Parse(format!("ESearch error: {error}")));
    }

    let total = root
        .child_text(NO_NS, "Count")
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let ids = root
        .child(NO_NS, "IdList")
        .map(|list| {
            list.children_named(NO_NS, "Id")
                .filter_map(Element::text)
                .collect()
        })
        .unwrap_or_default();
    Ok(SearchPage { ids, total })
}

pub fn parse_articles(body: &str) -> Result<Vec<PubmedRecord>> {
    let root = xml::parse(body)?;
    if !root.is(NO_NS, "PubmedArticleSet") {
        return Err(IngestError::Parse(format!(
            "Expected PubmedArticleSet, found <{}>",
            root.name()
        )));
    }

    let mut records = Vec::new();
    for article in root.children_named(NO_NS, "PubmedArticle") {
        match parse_article(article) {
            Some(record) => records.push(record),
            None => log_skipped_record!(SourceKind::Pubmed, "article without PMID or Article"),
        }
    }
    Ok(records)
}

fn parse_article(node: &Element) -> Option<PubmedRecord> {
    let pmid = node.find(NO_NS, "PMID").and_then(Element::text)?;
    let article = node.find(NO_NS, "Article")?;

    let authors = article
        .find_all(NO_NS, "Author")
        .into_iter()
        .filter_map(|author| {
            let last = author.child_text(NO_NS, "LastName")?;
            let name = match author.child_text(NO_NS, "ForeName") {
                Some(fore) => format!("{fore} {last}"),
                None => last,
            };
            Some(Author {
                name,
                affiliation: author.find(NO_NS, "Affiliation").and_then(Element::full_text),
            })
        })
        .collect();

    let date = article
        .find(NO_NS, "ArticleDate")
        .or_else(|| article.find(NO_NS, "PubDate"))
        .and_then(assemble_date);

    let mesh_terms = node
        .find_all(NO_NS, "MeshHeading")
        .into_iter()
        .filter_map(|heading| {
            let descriptor = heading.child(NO_NS, "DescriptorName")?;
            Some(MeshTerm {
                term: descriptor.full_text()?,
                ui: descriptor.attr("UI").map(str::to_string),
                major_topic: descriptor.attr("MajorTopicYN") == Some("Y"),
            })
        })
        .collect();

    let keywords = node
        .find_all(NO_NS, "Keyword")
        .into_iter()
        .filter_map(Element::full_text)
        .collect();

    // only the article's own ids, not those of its references
    let article_ids: Vec<&Element> = node
        .child(NO_NS, "PubmedData")
        .and_then(|data| data.child(NO_NS, "ArticleIdList"))
        .map(|list| list.children_named(NO_NS, "ArticleId").collect())
        .unwrap_or_default();
    let article_id = |kind: &str| {
        article_ids
            .iter()
            .find(|id| id.attr("IdType") == Some(kind))
            .and_then(|id| id.text())
    };

    Some(PubmedRecord {
        pmid,
        title: article.find(NO_NS, "ArticleTitle").and_then(Element::full_text),
        abstract_text: article.find(NO_NS, "Abstract").and_then(join_abstract),
        authors,
        journal: article
            .find(NO_NS, "Journal")
            .and_then(|j| j.child_text(NO_NS, "Title")),
        pub_date: date,
        mesh_terms,
        keywords,
        doi: article_id("doi"),
        pmc_id: article_id("pmc"),
    })
}

/// Abstract segments in document order, `Label: text` when labelled
pub fn join_abstract(abstract_node: &Element) -> Option<String> {
    let parts: Vec<String> = abstract_node
        .children_named(NO_NS, "AbstractText")
        .filter_map(|segment| {
            let text = segment.full_text()?;
            Some(match segment.attr("Label") {
                Some(label) if !label.trim().is_empty() => format!("{}: {text}", label.trim()),
                _ => text,
            })
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Month as a number from `3`, `03`, `Mar` or `March`; unknown values map to 1
pub fn month_number(month: &str) -> u32 {
    let month = month.trim();
    if let Ok(n) = month.parse::<u32>() {
        return if (1..=12).contains(&n) { n } else { 1 };
    }
    let prefix: String = month.chars().take(3).collect::<String>().to_lowercase();
    match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => 1,
    }
}

/// `YYYY-MM-DD` from Year/Month/Day children, defaulting month and day to 1
///
/// Falls back to the leading year of a free-text `MedlineDate`.
pub fn assemble_date(date: &Element) -> Option<String> {
    let year = match date.child_text(NO_NS, "Year") {
        Some(year) => year,
        None => {
            let medline = date.child_text(NO_NS, "MedlineDate")?;
            let year: String = medline.chars().take(4).collect();
            if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
                year
            } else {
                return None;
            }
        }
    };
    let month = date
        .child_text(NO_NS, "Month")
        .map(|m| month_number(&m))
        .unwrap_or(1);
    let day = date
        .child_text(NO_NS, "Day")
        .and_then(|d| d.parse::<u32>().ok())
        .filter(|d| (1..=31).contains(d))
        .unwrap_or(1);
    Some(format!("{year}-{month:02}-{day:02}"))
}

/// PubMed ingestion
pub struct TwoPhaseAdapter {
    config: PubmedConfig,
    ctx: AdapterContext,
    term: String,
}

impl TwoPhaseAdapter {
    pub fn new(config: PubmedConfig, ctx: AdapterContext) -> Self {
        let term = search_term(&config.search_terms);
        Self { config, ctx, term }
    }

    fn with_api_key(&self, params: &mut Vec<(&'static str, String)>) {
        if let Some(key) = self.config.active_api_key() {
            params.push(("api_key", key.expose_secret().as_str().to_string()));
        }
    }

    async fn search(
        &self,
        transport: &RetryableTransport,
        offset: u64,
        limit: u64,
    ) -> Result<SearchPage> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", self.term.clone()),
            ("retstart", offset.to_string()),
            ("retmax", limit.to_string()),
            ("retmode", "xml".to_string()),
            ("usehistory", "n".to_string()),
        ];
        self.with_api_key(&mut params);
        let response = transport.get(&self.config.esearch_url, &params).await?;
        parse_search(&response.body)
    }

    async fn fetch(&self, transport: &RetryableTransport, ids: &[String]) -> Result<Vec<PubmedRecord>> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
            ("rettype", "abstract".to_string()),
        ];
        self.with_api_key(&mut params);
        let response = transport.get(&self.config.efetch_url, &params).await?;
        parse_articles(&response.body)
    }

    async fn run(&self, progress: &mut Progress) -> Result<()> {
        let checkpoint = self.ctx.resume_point(SourceKind::Pubmed).await?;
        *progress = Progress::resumed(checkpoint.as_ref());
        let start = checkpoint
            .as_ref()
            .and_then(Checkpoint::cursor_position)
            .unwrap_or(0);

        tracing::info!(
            term = %self.term,
            with_api_key = self.config.active_api_key().is_some(),
            max_records = self.config.max_records,
            "Starting PubMed ingestion"
        );
        FetchLoop::new(
            &self.ctx,
            self,
            Pagination::Offset,
            self.config.batch_size,
            self.config.max_records,
            progress,
        )
        .run(Segment::starting_at(start))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PageSource for TwoPhaseAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::Pubmed
    }

    async fn fetch_page(
        &self,
        transport: &RetryableTransport,
        position: u64,
        limit: u64,
    ) -> Result<Page> {
        let search = self.search(transport, position, limit).await?;
        if search.ids.is_empty() {
            return Ok(Page {
                total: Some(search.total),
                ..Page::default()
            });
        }

        let records = self.fetch(transport, &search.ids).await?;
        tracing::debug!(
            searched = search.ids.len(),
            fetched = records.len(),
            total = search.total,
            "Fetched PubMed page"
        );
        Ok(Page {
            records: records.into_iter().map(RawRecord::from).collect(),
            returned: search.ids.len() as u64,
            total: Some(search.total),
        })
    }
}

#[async_trait]
impl SourceAdapter for TwoPhaseAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::Pubmed
    }

    async fn ingest(&self) -> SourceResult {
        let mut progress = Progress::default();
        let outcome = self.run(&mut progress).await;
        self.ctx.finish(SourceKind::Pubmed, progress, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::transport::tests::ScriptedBackend;
    use crate::adapters::http::HttpResponse;
    use crate::adapters::sources::tests::test_context_with;
    use crate::config::secret_string;
    use test_case::test_case;
    use tempfile::TempDir;

    const ARTICLES: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">38012345</PMID>
      <Article PubModel="Print-Electronic">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2023</Year><Month>Dec</Month></PubDate>
          </JournalIssue>
          <Title>Journal of Medical AI</Title>
        </Journal>
        <ArticleTitle>Deep learning for <i>sepsis</i> triage.</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Sepsis is common.</AbstractText>
          <AbstractText Label="RESULTS">AUC was 0.91.</AbstractText>
          <AbstractText>Unlabelled tail.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y">
            <LastName>Lovelace</LastName><ForeName>Ada</ForeName>
            <AffiliationInfo><Affiliation>Analytical Engines Ltd, London.</Affiliation></AffiliationInfo>
          </Author>
          <Author ValidYN="Y"><LastName>Hopper</LastName></Author>
          <Author ValidYN="Y"><CollectiveName>Sepsis Study Group</CollectiveName></Author>
        </AuthorList>
        <ArticleDate DateType="Electronic"><Year>2023</Year><Month>11</Month><Day>7</Day></ArticleDate>
      </Article>
      <MeshHeadingList>
        <MeshHeading><DescriptorName UI="D018805" MajorTopicYN="Y">Sepsis</DescriptorName></MeshHeading>
        <MeshHeading><DescriptorName UI="D006801" MajorTopicYN="N">Humans</DescriptorName></MeshHeading>
      </MeshHeadingList>
      <KeywordList Owner="NOTNLM"><Keyword MajorTopicYN="N">triage</Keyword><Keyword MajorTopicYN="N">deep learning</Keyword></KeywordList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">38012345</ArticleId>
        <ArticleId IdType="doi">10.1000/jmai.2023.1</ArticleId>
        <ArticleId IdType="pmc">PMC1234567</ArticleId>
      </ArticleIdList>
      <ReferenceList>
        <Reference><ArticleIdList><ArticleId IdType="doi">10.9999/other</ArticleId></ArticleIdList></Reference>
      </ReferenceList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation><Article><ArticleTitle>No PMID</ArticleTitle></Article></MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    fn search_body(ids: &[u32], count: u64) -> String {
        let ids: String = ids.iter().map(|id| format!("<Id>{id}</Id>")).collect();
        format!(
            "<eSearchResult><Count>{count}</Count><RetMax>5</RetMax><RetStart>0</RetStart><IdList>{ids}</IdList></eSearchResult>"
        )
    }

    fn fetch_body(ids: &[u32]) -> String {
        let articles: String = ids
            .iter()
            .map(|id| {
                format!(
                    "<PubmedArticle><MedlineCitation><PMID>{id}</PMID><Article><ArticleTitle>Paper {id}</ArticleTitle></Article></MedlineCitation></PubmedArticle>"
                )
            })
            .collect();
        format!("<PubmedArticleSet>{articles}</PubmedArticleSet>")
    }

    #[test]
    fn test_search_term() {
        let terms = vec!["machine learning".to_string(), " sepsis ".to_string()];
        assert_eq!(
            search_term(&terms),
            r#""machine learning"[Title/Abstract] OR "sepsis"[Title/Abstract]"#
        );
    }

    #[test]
    fn test_parse_search() {
        let page = parse_search(&search_body(&[1, 2, 3], 8)).unwrap();
        assert_eq!(page.ids, vec!["1", "2", "3"]);
        assert_eq!(page.total, 8);

        let empty = parse_search("<eSearchResult><Count>0</Count><IdList/></eSearchResult>").unwrap();
        assert!(empty.ids.is_empty());

        let error = "<eSearchResult><ERROR>Invalid query</ERROR></eSearchResult>";
        assert!(parse_search(error).is_err());
    }

    #[test]
    fn test_parse_articles() {
        let records = parse_articles(ARTICLES).unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.pmid, "38012345");
        assert_eq!(r.title.as_deref(), Some("Deep learning for sepsis triage."));
        assert_eq!(
            r.abstract_text.as_deref(),
            Some("BACKGROUND: Sepsis is common. RESULTS: AUC was 0.91. Unlabelled tail.")
        );
        assert_eq!(r.authors.len(), 2);
        assert_eq!(r.authors[0].name, "Ada Lovelace");
        assert_eq!(
            r.authors[0].affiliation.as_deref(),
            Some("Analytical Engines Ltd, London.")
        );
        assert_eq!(r.authors[1].name, "Hopper");
        assert_eq!(r.journal.as_deref(), Some("Journal of Medical AI"));
        // ArticleDate wins over PubDate
        assert_eq!(r.pub_date.as_deref(), Some("2023-11-07"));
        assert_eq!(r.mesh_terms.len(), 2);
        assert!(r.mesh_terms[0].major_topic);
        assert_eq!(r.mesh_terms[0].ui.as_deref(), Some("D018805"));
        assert!(!r.mesh_terms[1].major_topic);
        assert_eq!(r.keywords, vec!["triage", "deep learning"]);
        assert_eq!(r.doi.as_deref(), Some("10.1000/jmai.2023.1"));
        assert_eq!(r.pmc_id.as_deref(), Some("PMC1234567"));
    }

    #[test_case("<PubDate><Year>2023</Year><Month>Dec</Month></PubDate>", Some("2023-12-01") ; "month abbreviation")]
    #[test_case("<PubDate><Year>2023</Year></PubDate>", Some("2023-01-01") ; "year only")]
    #[test_case("<PubDate><Year>2021</Year><Month>09</Month><Day>30</Day></PubDate>", Some("2021-09-30") ; "numeric parts")]
    #[test_case("<PubDate><Year>2020</Year><Month>Spring</Month></PubDate>", Some("2020-01-01") ; "unknown month")]
    #[test_case("<PubDate><MedlineDate>2019 Jan-Feb</MedlineDate></PubDate>", Some("2019-01-01") ; "medline date")]
    #[test_case("<PubDate><Season>Summer</Season></PubDate>", None ; "no year")]
    fn test_assemble_date(xml_text: &str, expected: Option<&str>) {
        let node = xml::parse(xml_text).unwrap();
        assert_eq!(assemble_date(&node).as_deref(), expected);
    }

    #[test_case("Jan", 1)]
    #[test_case("february", 2)]
    #[test_case("SEP", 9)]
    #[test_case("12", 12)]
    #[test_case("13", 1)]
    #[test_case("", 1)]
    fn test_month_number(input: &str, expected: u32) {
        assert_eq!(month_number(input), expected);
    }

    #[test]
    fn test_abstract_without_segments() {
        let node = xml::parse("<Abstract><CopyrightInformation>(c) 2024</CopyrightInformation></Abstract>").unwrap();
        assert_eq!(join_abstract(&node), None);
    }

    #[tokio::test]
    async fn test_ingest_pages_through_search_and_fetch() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new(vec![
            Ok(HttpResponse::ok(search_body(&[1, 2, 3], 5))),
            Ok(HttpResponse::ok(fetch_body(&[1, 2, 3]))),
            Ok(HttpResponse::ok(search_body(&[4, 5], 5))),
            Ok(HttpResponse::ok(fetch_body(&[4, 5]))),
        ]);
        let (ctx, _tx) = test_context_with(dir.path(), backend.clone());
        let config = PubmedConfig {
            enabled: true,
            batch_size: 3,
            ..PubmedConfig::default()
        };

        let result = TwoPhaseAdapter::new(config, ctx.clone()).ingest().await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.records_ingested, 5);
        assert_eq!(result.batches, 2);
        assert_eq!(backend.calls(), 4);
        assert!(ctx.checkpoints.get(SourceKind::Pubmed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_rejection_is_recorded_and_skipped() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new(vec![
            Ok(HttpResponse::ok(search_body(&[1, 2], 4))),
            Ok(HttpResponse::with_status(400, "bad id list")),
            Ok(HttpResponse::ok(search_body(&[3, 4], 4))),
            Ok(HttpResponse::ok(fetch_body(&[3, 4]))),
        ]);
        let (ctx, _tx) = test_context_with(dir.path(), backend);
        let config = PubmedConfig {
            enabled: true,
            batch_size: 2,
            ..PubmedConfig::default()
        };

        let result = TwoPhaseAdapter::new(config, ctx.clone()).ingest().await;

        assert_eq!(result.records_ingested, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("offset 0"));
        let checkpoint = ctx.checkpoints.get(SourceKind::Pubmed).await.unwrap().unwrap();
        assert_eq!(checkpoint.cursor, "4");
    }

    #[test]
    fn test_api_key_only_when_enabled() {
        let dir = TempDir::new().unwrap();
        let (ctx, _tx) = test_context_with(dir.path(), ScriptedBackend::new(vec![]));
        let mut config = PubmedConfig {
            api_key: Some(secret_string("k3y".to_string())),
            ..PubmedConfig::default()
        };

        let mut params = Vec::new();
        TwoPhaseAdapter::new(config.clone(), ctx.clone()).with_api_key(&mut params);
        assert!(params.is_empty());

        config.use_api_key = true;
        TwoPhaseAdapter::new(config, ctx).with_api_key(&mut params);
        assert_eq!(params, vec![("api_key", "k3y".to_string())]);
    }
}
