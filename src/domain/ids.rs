//! Domain identifier types with validation
//!
//! Sources and batches are named on disk (partition directories, batch files,
//! checkpoint files), so both identifiers are restricted to path-safe values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream source identifier
///
/// # Examples
///
/// ```
/// use scholarly_ingest::domain::ids::SourceKind;
/// use std::str::FromStr;
///
/// let source = SourceKind::from_str("pubmed").unwrap();
/// assert_eq!(source.as_str(), "pubmed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// arXiv Atom feed
    Arxiv,
    /// PubMed E-utilities (search + fetch)
    Pubmed,
    /// OpenAlex works API
    #[serde(rename = "openalex")]
    OpenAlex,
}

impl SourceKind {
    /// All known sources, in run order
    pub const ALL: [SourceKind; 3] = [SourceKind::Arxiv, SourceKind::Pubmed, SourceKind::OpenAlex];

    /// Returns the source tag used in file paths and staged records
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Arxiv => "arxiv",
            SourceKind::Pubmed => "pubmed",
            SourceKind::OpenAlex => "openalex",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arxiv" => Ok(SourceKind::Arxiv),
            "pubmed" => Ok(SourceKind::Pubmed),
            "openalex" => Ok(SourceKind::OpenAlex),
            other => Err(format!(
                "Unknown source '{other}'. Must be one of: arxiv, pubmed, openalex"
            )),
        }
    }
}

impl AsRef<str> for SourceKind {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Batch identifier newtype wrapper
///
/// Names exactly one staged file. Offset-paginated sources use
/// `batch_{offset:08}`, page-numbered sources use `page_{page:06}`.
///
/// # Examples
///
/// ```
/// use scholarly_ingest::domain::ids::BatchId;
///
/// assert_eq!(BatchId::for_offset(100).as_str(), "batch_00000100");
/// assert_eq!(BatchId::for_page(3).as_str(), "page_000003");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Creates a new BatchId, rejecting anything that is not a plain file stem
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Batch ID cannot be empty".to_string());
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!(
                "Batch ID '{id}' may only contain ASCII letters, digits, '_' and '-'"
            ));
        }
        Ok(Self(id))
    }

    /// Batch id for an offset-paginated fetch
    pub fn for_offset(offset: u64) -> Self {
        Self(format!("batch_{offset:08}"))
    }

    /// Batch id for an offset-paginated fetch inside a year bin
    pub fn for_year_offset(year: i32, offset: u64) -> Self {
        Self(format!("batch_y{year}_{offset:08}"))
    }

    /// Batch id for a page-numbered fetch
    pub fn for_page(page: u64) -> Self {
        Self(format!("page_{page:06}"))
    }

    /// Returns the batch ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
