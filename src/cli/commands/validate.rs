//! Validate config command implementation
//!
//! This module implements the `validate-config` command.

use crate::config::load_config;
use crate::domain::SourceKind;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as its last step
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.logging.level);
        println!("  Checkpoint Dir: {}", config.global.checkpoint_dir);
        println!("  Raw Data Dir: {}", config.global.raw_data_dir);
        println!("  Compress: {}", config.global.compress);
        println!("  Concurrent Sources: {}", config.global.concurrent_sources);
        println!("  Resume: {}", config.global.resume);

        let enabled = config.enabled_sources();
        if enabled.is_empty() {
            println!("  ⚠️  No sources enabled");
        }
        for source in enabled {
            match source {
                SourceKind::Arxiv => {
                    let arxiv = &config.arxiv;
                    println!("  arXiv:");
                    println!("    Categories: {:?}", arxiv.categories);
                    println!("    Max Records: {}", arxiv.max_records);
                    println!("    Batch Size: {}", arxiv.batch_size);
                    println!("    Year Balanced: {}", arxiv.year_balance.enabled);
                }
                SourceKind::Pubmed => {
                    let pubmed = &config.pubmed;
                    println!("  PubMed:");
                    println!("    Search Terms: {:?}", pubmed.search_terms);
                    println!("    Max Records: {}", pubmed.max_records);
                    println!("    Batch Size: {}", pubmed.batch_size);
                    println!(
                        "    API Key: {}",
                        if pubmed.active_api_key().is_some() {
                            "configured"
                        } else {
                            "none"
                        }
                    );
                }
                SourceKind::OpenAlex => {
                    let openalex = &config.openalex;
                    println!("  OpenAlex:");
                    println!("    Concepts: {:?}", openalex.filters.concepts);
                    println!("    Max Records: {}", openalex.max_records);
                    println!("    Per Page: {}", openalex.effective_per_page());
                    println!("    Mailto: {}", openalex.email);
                }
            }
        }
        println!();
        Ok(0)
    }
}
