//! Configuration management.
//!
//! TOML configuration with `${VAR_NAME}` substitution, `SCHOLARLY_*`
//! environment overrides, defaults for every setting, and validation on load.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scholarly_ingest::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("ingest.toml")?;
//! for source in config.enabled_sources() {
//!     println!("enabled: {source}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [global]
//! checkpoint_dir = "data/checkpoints"
//! raw_data_dir = "data/raw"
//! compress = true
//!
//! [arxiv]
//! categories = ["cs.AI", "cs.LG"]
//! max_records = 5000
//!
//! [arxiv.year_balance]
//! enabled = true
//!
//! [pubmed]
//! enabled = true
//! search_terms = ["machine learning", "deep learning"]
//! api_key = "${NCBI_API_KEY}"
//! use_api_key = true
//!
//! [openalex]
//! enabled = true
//!
//! [openalex.filters]
//! concepts = ["C154945302"]
//! from_publication_date = "2020-01-01"
//! has_doi = true
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config};
pub use schema::{
    ArxivConfig, GlobalConfig, IngestConfig, LoggingConfig, OpenAlexConfig, OpenAlexFilters,
    PubmedConfig, RateLimitConfig, YearBalanceConfig, YearBin,
};
pub use secret::{secret_string, SecretString, SecretValue};
