//! Source record models
//!
//! Each upstream has its own record shape. Field names and nesting are what
//! the downstream batch ETL reads out of the staged NDJSON files, so they
//! must stay stable; the Rust field names are mapped with serde where they
//! differ (`abstract` is a keyword).

use crate::domain::ids::SourceKind;
use serde::{Deserialize, Serialize};

/// Author with optional affiliation, shared by the XML sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub affiliation: Option<String>,
}

/// Link attached to an arXiv entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub href: Option<String>,
    #[serde(rename = "type")]
    pub link_type: Option<String>,
    pub rel: String,
}

/// arXiv Atom entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxivRecord {
    pub arxiv_id: String,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub authors: Vec<Author>,
    pub categories: Vec<String>,
    pub primary_category: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub doi: Option<String>,
    pub journal_ref: Option<String>,
    pub comment: Option<String>,
    pub links: Vec<Link>,
}

/// MeSH descriptor attached to a PubMed article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshTerm {
    pub term: String,
    pub ui: Option<String>,
    pub major_topic: bool,
}

/// PubMed article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubmedRecord {
    pub pmid: String,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub authors: Vec<Author>,
    pub journal: Option<String>,
    /// `YYYY-MM-DD`
    pub pub_date: Option<String>,
    pub mesh_terms: Vec<MeshTerm>,
    pub keywords: Vec<String>,
    pub doi: Option<String>,
    pub pmc_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexAuthor {
    pub openalex_id: Option<String>,
    pub name: Option<String>,
    pub orcid: Option<String>,
    pub position: Option<String>,
    pub affiliations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: Option<String>,
    pub name: Option<String>,
    pub level: Option<i64>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub venue_type: Option<String>,
    /// Linking ISSN (`issn_l`)
    pub issn: Option<String>,
}

/// OpenAlex work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexRecord {
    pub openalex_id: String,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub publication_year: Option<i64>,
    pub publication_date: Option<String>,
    #[serde(rename = "type")]
    pub work_type: Option<String>,
    pub cited_by_count: i64,
    pub authors: Vec<OpenAlexAuthor>,
    pub concepts: Vec<Concept>,
    pub venue: Option<Venue>,
    pub referenced_works: Vec<String>,
    pub related_works: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub is_oa: bool,
    pub oa_status: Option<String>,
    pub oa_url: Option<String>,
    pub cited_by_api_url: Option<String>,
}

/// A record from any source, before ingestion metadata is stamped on
///
/// Serialized untagged, so each variant produces exactly its source's
/// flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawRecord {
    Arxiv(ArxivRecord),
    Pubmed(PubmedRecord),
    OpenAlex(OpenAlexRecord),
}

impl RawRecord {
    pub fn source(&self) -> SourceKind {
        match self {
            RawRecord::Arxiv(_) => SourceKind::Arxiv,
            RawRecord::Pubmed(_) => SourceKind::Pubmed,
            RawRecord::OpenAlex(_) => SourceKind::OpenAlex,
        }
    }

    /// Source-native identifier
    pub fn native_id(&self) -> &str {
        match self {
            RawRecord::Arxiv(r) => &r.arxiv_id,
            RawRecord::Pubmed(r) => &r.pmid,
            RawRecord::OpenAlex(r) => &r.openalex_id,
        }
    }

    /// Referenced work ids; only the JSON source supplies them
    pub fn references(&self) -> &[String] {
        match self {
            RawRecord::OpenAlex(r) => &r.referenced_works,
            _ => &[],
        }
    }
}

impl From<ArxivRecord> for RawRecord {
    fn from(r: ArxivRecord) -> Self {
        RawRecord::Arxiv(r)
    }
}

impl From<PubmedRecord> for RawRecord {
    fn from(r: PubmedRecord) -> Self {
        RawRecord::Pubmed(r)
    }
}

impl From<OpenAlexRecord> for RawRecord {
    fn from(r: OpenAlexRecord) -> Self {
        RawRecord::OpenAlex(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubmed() -> PubmedRecord {
        PubmedRecord {
            pmid: "12345".into(),
            title: Some("Deep learning for triage".into()),
            abstract_text: Some("Background: text".into()),
            authors: vec![Author {
                name: "Ada Lovelace".into(),
                affiliation: None,
            }],
            journal: Some("J Med AI".into()),
            pub_date: Some("2023-03-01".into()),
            mesh_terms: vec![],
            keywords: vec!["ml".into()],
            doi: None,
            pmc_id: None,
        }
    }

    #[test]
    fn test_raw_record_serializes_flat() {
        let value = serde_json::to_value(RawRecord::from(pubmed())).unwrap();
        assert_eq!(value["pmid"], "12345");
        assert_eq!(value["abstract"], "Background: text");
        assert!(value.get("Pubmed").is_none());
        assert!(value.get("abstract_text").is_none());
    }

    #[test]
    fn test_native_id_and_references() {
        let record = RawRecord::from(pubmed());
        assert_eq!(record.source(), SourceKind::Pubmed);
        assert_eq!(record.native_id(), "12345");
        assert!(record.references().is_empty());
    }

    #[test]
    fn test_link_type_field_name() {
        let link = Link {
            href: Some("http://arxiv.org/pdf/2301.00001v1".into()),
            link_type: Some("application/pdf".into()),
            rel: "related".into(),
        };
        let value = serde_json::to_value(&link).unwrap();
        assert_eq!(value["type"], "application/pdf");
    }
}
