//! Configuration schema types
//!
//! This module defines the configuration structure that maps to the TOML file.

use crate::config::SecretString;
use crate::domain::ids::SourceKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Main configuration
///
/// This is the root configuration structure that maps to the TOML file.
/// Every section has defaults, so an empty file is a valid (arXiv-only)
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestConfig {
    /// Run-wide settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// arXiv Atom feed source
    #[serde(default)]
    pub arxiv: ArxivConfig,

    /// PubMed E-utilities source
    #[serde(default)]
    pub pubmed: PubmedConfig,

    /// OpenAlex works source
    #[serde(default)]
    pub openalex: OpenAlexConfig,
}

impl IngestConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.global.validate()?;
        self.logging.validate()?;
        self.arxiv.validate()?;
        self.pubmed.validate()?;
        self.openalex.validate()?;
        Ok(())
    }

    /// Sources whose `enabled` flag is set, in run order
    pub fn enabled_sources(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }

    pub fn is_enabled(&self, source: SourceKind) -> bool {
        match source {
            SourceKind::Arxiv => self.arxiv.enabled,
            SourceKind::Pubmed => self.pubmed.enabled,
            SourceKind::OpenAlex => self.openalex.enabled,
        }
    }

    /// Enables `source` and disables every other one
    pub fn enable_only(&mut self, source: SourceKind) {
        self.arxiv.enabled = source == SourceKind::Arxiv;
        self.pubmed.enabled = source == SourceKind::Pubmed;
        self.openalex.enabled = source == SourceKind::OpenAlex;
    }

    /// Overrides the record ceiling of one source
    pub fn set_max_records(&mut self, source: SourceKind, max_records: u64) {
        match source {
            SourceKind::Arxiv => self.arxiv.max_records = max_records,
            SourceKind::Pubmed => self.pubmed.max_records = max_records,
            SourceKind::OpenAlex => self.openalex.max_records = max_records,
        }
    }
}

/// Run-wide settings shared by every source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Directory holding one checkpoint file per source
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// Root of the partitioned staging area
    #[serde(default = "default_raw_data_dir")]
    pub raw_data_dir: String,

    /// Gzip staged batch files
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Run enabled sources concurrently instead of one after another
    #[serde(default = "default_true")]
    pub concurrent_sources: bool,

    /// Resume from existing checkpoints
    #[serde(default = "default_true")]
    pub resume: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Records between flushes in streaming writes
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,
}

impl GlobalConfig {
    fn validate(&self) -> Result<(), String> {
        if self.checkpoint_dir.trim().is_empty() {
            return Err("global.checkpoint_dir cannot be empty".to_string());
        }
        if self.raw_data_dir.trim().is_empty() {
            return Err("global.raw_data_dir cannot be empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("global.request_timeout_secs must be > 0".to_string());
        }
        if self.flush_interval == 0 {
            return Err("global.flush_interval must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            raw_data_dir: default_raw_data_dir(),
            compress: true,
            concurrent_sources: true,
            resume: true,
            request_timeout_secs: default_request_timeout_secs(),
            flush_interval: default_flush_interval(),
        }
    }
}

/// Rate limiting and retry parameters for one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained request rate; fractional values are allowed
    ///
    /// When absent the source default applies (see [`RateLimitConfig::rate_or`]).
    #[serde(default)]
    pub requests_per_second: Option<f64>,

    /// Token bucket capacity
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Attempts per request for transient failures
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff base; the wait before retry `n` (0-based) is `factor^n` seconds
    #[serde(default = "default_retry_backoff_factor")]
    pub retry_backoff_factor: f64,

    /// Consecutive 429 responses honored per request before giving up
    #[serde(default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Wait applied to a 429 without a usable `Retry-After` header
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
}

impl RateLimitConfig {
    /// Configured rate, or the given source default
    pub fn rate_or(&self, default_rps: f64) -> f64 {
        self.requests_per_second.unwrap_or(default_rps)
    }

    fn validate(&self, section: &str) -> Result<(), String> {
        if let Some(rps) = self.requests_per_second {
            if !(rps.is_finite() && rps > 0.0) {
                return Err(format!(
                    "{section}.rate_limit.requests_per_second must be > 0 (got {rps})"
                ));
            }
        }
        if self.burst_size == 0 {
            return Err(format!("{section}.rate_limit.burst_size must be > 0"));
        }
        if self.retry_attempts == 0 || self.retry_attempts > 10 {
            return Err(format!(
                "{section}.rate_limit.retry_attempts must be between 1 and 10 (got {})",
                self.retry_attempts
            ));
        }
        if !(self.retry_backoff_factor.is_finite() && self.retry_backoff_factor >= 1.0) {
            return Err(format!(
                "{section}.rate_limit.retry_backoff_factor must be >= 1.0"
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            burst_size: default_burst_size(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_factor: default_retry_backoff_factor(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
            default_retry_after_secs: default_retry_after_secs(),
        }
    }
}

/// Inclusive range of submission years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearBin {
    pub start: i32,
    pub end: i32,
}

/// Year-balanced sampling for the feed source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearBalanceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Bins ordered oldest to newest
    #[serde(default = "default_year_bins")]
    pub bins: Vec<YearBin>,

    /// Relative share of the ceiling per bin, same order as `bins`
    #[serde(default = "default_year_weights")]
    pub weights: Vec<f64>,

    /// Lower bound on any bin's target
    #[serde(default = "default_min_per_bin")]
    pub min_per_bin: u64,
}

impl YearBalanceConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.bins.is_empty() {
            return Err("arxiv.year_balance.bins cannot be empty when enabled".to_string());
        }
        if self.weights.len() != self.bins.len() {
            return Err(format!(
                "arxiv.year_balance.weights has {} entries but there are {} bins",
                self.weights.len(),
                self.bins.len()
            ));
        }
        if self.weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err("arxiv.year_balance.weights must all be > 0".to_string());
        }
        for bin in &self.bins {
            if bin.start > bin.end {
                return Err(format!(
                    "arxiv.year_balance bin {}-{} starts after it ends",
                    bin.start, bin.end
                ));
            }
        }
        Ok(())
    }
}

impl Default for YearBalanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bins: default_year_bins(),
            weights: default_year_weights(),
            min_per_bin: default_min_per_bin(),
        }
    }
}

/// arXiv Atom feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_arxiv_url")]
    pub base_url: String,

    #[serde(default = "default_max_records")]
    pub max_records: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Category codes, OR-ed together (`cat:cs.AI OR cat:cs.LG`)
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub year_balance: YearBalanceConfig,
}

impl ArxivConfig {
    /// Published arXiv API allowance (one request every three seconds)
    pub const DEFAULT_RPS: f64 = 0.33;

    fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        validate_url("arxiv.base_url", &self.base_url)?;
        validate_sizes("arxiv", self.max_records, self.batch_size)?;
        if self.categories.iter().all(|c| c.trim().is_empty()) {
            return Err("arxiv.categories cannot be empty".to_string());
        }
        self.rate_limit.validate("arxiv")?;
        self.year_balance.validate()?;
        Ok(())
    }
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_arxiv_url(),
            max_records: default_max_records(),
            batch_size: default_batch_size(),
            categories: default_categories(),
            rate_limit: RateLimitConfig::default(),
            year_balance: YearBalanceConfig::default(),
        }
    }
}

/// PubMed E-utilities configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubmedConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_esearch_url")]
    pub esearch_url: String,

    #[serde(default = "default_efetch_url")]
    pub efetch_url: String,

    #[serde(default = "default_max_records")]
    pub max_records: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Free-text terms, each matched against title and abstract
    #[serde(default = "default_search_terms")]
    pub search_terms: Vec<String>,

    /// NCBI API key
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Send `api_key` with every request
    #[serde(default)]
    pub use_api_key: bool,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl PubmedConfig {
    /// NCBI allowance without a key
    pub const DEFAULT_RPS: f64 = 3.0;
    /// NCBI allowance with a key
    pub const DEFAULT_RPS_WITH_KEY: f64 = 10.0;

    /// The key to send, if one is configured and enabled
    pub fn active_api_key(&self) -> Option<&SecretString> {
        if self.use_api_key {
            self.api_key.as_ref()
        } else {
            None
        }
    }

    /// Default rate depends on whether a key is in use
    pub fn default_rps(&self) -> f64 {
        if self.active_api_key().is_some() {
            Self::DEFAULT_RPS_WITH_KEY
        } else {
            Self::DEFAULT_RPS
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        validate_url("pubmed.esearch_url", &self.esearch_url)?;
        validate_url("pubmed.efetch_url", &self.efetch_url)?;
        validate_sizes("pubmed", self.max_records, self.batch_size)?;
        if self.search_terms.iter().all(|t| t.trim().is_empty()) {
            return Err("pubmed.search_terms cannot be empty".to_string());
        }
        if self.use_api_key && self.api_key.is_none() {
            return Err("pubmed.use_api_key is set but pubmed.api_key not provided".to_string());
        }
        self.rate_limit.validate("pubmed")?;
        Ok(())
    }
}

impl Default for PubmedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            esearch_url: default_esearch_url(),
            efetch_url: default_efetch_url(),
            max_records: default_max_records(),
            batch_size: default_batch_size(),
            search_terms: default_search_terms(),
            api_key: None,
            use_api_key: false,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Facets combined into the OpenAlex `filter` parameter
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAlexFilters {
    /// Concept ids, OR-ed (`concepts.id:C1|C2`)
    #[serde(default)]
    pub concepts: Vec<String>,

    /// Inclusive lower publication date, `YYYY-MM-DD`
    #[serde(default)]
    pub from_publication_date: Option<String>,

    /// Inclusive upper publication date, `YYYY-MM-DD`
    #[serde(default)]
    pub to_publication_date: Option<String>,

    /// Only works with a DOI
    #[serde(default)]
    pub has_doi: bool,

    /// Only works cited more than this many times
    #[serde(default)]
    pub cited_by_count_min: Option<u64>,
}

/// OpenAlex works configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAlexConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_openalex_url")]
    pub base_url: String,

    #[serde(default = "default_max_records")]
    pub max_records: u64,

    #[serde(default = "default_per_page")]
    pub per_page: u64,

    /// Contact address for the polite pool (`mailto`)
    #[serde(default = "default_email")]
    pub email: String,

    #[serde(default)]
    pub filters: OpenAlexFilters,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl OpenAlexConfig {
    pub const DEFAULT_RPS: f64 = 10.0;
    /// Largest page the API serves
    pub const MAX_PER_PAGE: u64 = 200;

    /// Page size actually requested
    pub fn effective_per_page(&self) -> u64 {
        self.per_page.min(Self::MAX_PER_PAGE)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        validate_url("openalex.base_url", &self.base_url)?;
        validate_sizes("openalex", self.max_records, self.per_page)?;
        for (name, value) in [
            ("from_publication_date", &self.filters.from_publication_date),
            ("to_publication_date", &self.filters.to_publication_date),
        ] {
            if let Some(date) = value {
                NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                    format!("openalex.filters.{name} '{date}' must be formatted YYYY-MM-DD")
                })?;
            }
        }
        self.rate_limit.validate("openalex")?;
        Ok(())
    }
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_openalex_url(),
            max_records: default_max_records(),
            per_page: default_per_page(),
            email: default_email(),
            filters: OpenAlexFilters::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON file logging next to console output
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for log files
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy (daily, hourly, never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.level,
                valid_levels.join(", ")
            ));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), String> {
    let parsed =
        url::Url::parse(value).map_err(|e| format!("{field} '{value}' is not a valid URL: {e}"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("{field} must use http or https"));
    }
    Ok(())
}

fn validate_sizes(section: &str, max_records: u64, page_size: u64) -> Result<(), String> {
    if max_records == 0 {
        return Err(format!("{section}.max_records must be > 0"));
    }
    if page_size == 0 {
        return Err(format!("{section} page size must be > 0"));
    }
    Ok(())
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_checkpoint_dir() -> String {
    "data/checkpoints".to_string()
}

fn default_raw_data_dir() -> String {
    "data/raw".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_flush_interval() -> usize {
    100
}

fn default_burst_size() -> u32 {
    1
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_factor() -> f64 {
    2.0
}

fn default_max_rate_limit_waits() -> u32 {
    10
}

fn default_retry_after_secs() -> u64 {
    60
}

fn default_year_bins() -> Vec<YearBin> {
    vec![
        YearBin { start: 2015, end: 2017 },
        YearBin { start: 2018, end: 2020 },
        YearBin { start: 2021, end: 2022 },
        YearBin { start: 2023, end: 2024 },
    ]
}

fn default_year_weights() -> Vec<f64> {
    vec![0.15, 0.20, 0.25, 0.40]
}

fn default_min_per_bin() -> u64 {
    20
}

fn default_arxiv_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}

fn default_esearch_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi".to_string()
}

fn default_efetch_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi".to_string()
}

fn default_openalex_url() -> String {
    "https://api.openalex.org/works".to_string()
}

fn default_max_records() -> u64 {
    1000
}

fn default_batch_size() -> u64 {
    100
}

fn default_per_page() -> u64 {
    200
}

fn default_categories() -> Vec<String> {
    vec!["cs.AI".to_string()]
}

fn default_search_terms() -> Vec<String> {
    vec!["machine learning".to_string()]
}

fn default_email() -> String {
    "scholarly-graph@nyu.edu".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_local_path() -> String {
    "logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
