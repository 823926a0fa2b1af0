//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "scholarly-ingest.toml")]
    pub output: String,

    /// Include every option with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing Scholarly Ingest configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} and enable the sources you need", self.output);
                println!("  2. Optionally put SCHOLARLY_PUBMED_API_KEY in a .env file");
                println!("  3. Validate configuration: scholarly-ingest validate-config");
                println!("  4. Run ingestion: scholarly-ingest ingest");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(1)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# Scholarly Ingest Configuration File

[global]
checkpoint_dir = "data/checkpoints"
raw_data_dir = "data/raw"
compress = true

[logging]
level = "info"

[arxiv]
enabled = true
categories = ["cs.AI", "cs.LG"]
max_records = 1000

[pubmed]
enabled = false
search_terms = ["machine learning"]

[openalex]
enabled = false
email = "you@example.org"
"#
        .to_string()
    }

    /// Generate configuration with every option and comments
    fn generate_config_with_examples() -> String {
        r#"# Scholarly Ingest Configuration File
#
# Every value below is the default unless marked otherwise.
# ${VAR} placeholders are substituted from the environment, and
# SCHOLARLY_<SECTION>_<KEY> variables override values after parsing.

[global]
# One checkpoint file per source lives here
checkpoint_dir = "data/checkpoints"
# Staged files: <raw_data_dir>/<source>/ingest_date=YYYY-MM-DD/<batch_id>.ndjson.gz
raw_data_dir = "data/raw"
compress = true
# Run enabled sources at the same time
concurrent_sources = true
# Pick up where the last run stopped
resume = true
request_timeout_secs = 30
flush_interval = 100

[logging]
level = "info"              # trace | debug | info | warn | error
local_enabled = false       # JSON log files next to console output
local_path = "logs"
local_rotation = "daily"    # daily | hourly | never

[arxiv]
enabled = true
base_url = "https://export.arxiv.org/api/query"
max_records = 1000
batch_size = 100
categories = ["cs.AI", "cs.LG", "cs.CL"]

[arxiv.rate_limit]
requests_per_second = 0.33
burst_size = 1
retry_attempts = 3
retry_backoff_factor = 2.0
max_rate_limit_waits = 10
default_retry_after_secs = 60

# Spread records over submission years instead of taking the newest only
[arxiv.year_balance]
enabled = false
weights = [0.15, 0.20, 0.25, 0.40]
min_per_bin = 20

[[arxiv.year_balance.bins]]
start = 2015
end = 2017

[[arxiv.year_balance.bins]]
start = 2018
end = 2020

[[arxiv.year_balance.bins]]
start = 2021
end = 2022

[[arxiv.year_balance.bins]]
start = 2023
end = 2024

[pubmed]
enabled = false
esearch_url = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi"
efetch_url = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi"
max_records = 1000
batch_size = 100
search_terms = ["machine learning", "deep learning"]
# An NCBI key raises the default rate from 3 to 10 requests per second
# api_key = "${NCBI_API_KEY}"
use_api_key = false

[pubmed.rate_limit]
burst_size = 1
retry_attempts = 3

[openalex]
enabled = false
base_url = "https://api.openalex.org/works"
max_records = 1000
per_page = 200              # 200 is the API maximum
email = "you@example.org"   # sent as mailto for the polite pool

[openalex.filters]
concepts = ["C154945302", "C119857082"]
from_publication_date = "2020-01-01"
to_publication_date = "2024-12-31"
has_doi = true
cited_by_count_min = 5

[openalex.rate_limit]
requests_per_second = 10.0
burst_size = 1
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::domain::SourceKind;
    use tempfile::TempDir;

    #[test]
    fn test_generate_minimal_config() {
        let config = parse_config(&InitArgs::generate_minimal_config()).unwrap();
        assert_eq!(config.enabled_sources(), vec![SourceKind::Arxiv]);
    }

    #[test]
    fn test_generate_config_with_examples() {
        let config = parse_config(&InitArgs::generate_config_with_examples()).unwrap();
        assert_eq!(config.arxiv.year_balance.bins.len(), 4);
        assert_eq!(config.openalex.filters.cited_by_count_min, Some(5));
        assert!(config.pubmed.api_key.is_none());
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("scholarly-ingest.toml");
        fs::write(&output, "# keep me").unwrap();

        let mut args = InitArgs {
            output: output.display().to_string(),
            with_examples: false,
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 2);
        assert_eq!(fs::read_to_string(&output).unwrap(), "# keep me");

        args.force = true;
        assert_eq!(args.execute().await.unwrap(), 0);
        assert!(fs::read_to_string(&output).unwrap().contains("[arxiv]"));
    }
}
