//! Ingest command implementation
//!
//! This module implements the `ingest` command, which runs every enabled
//! source into the staging area.

use crate::config::{load_config, IngestConfig};
use crate::core::ingest::{Orchestrator, RunSummary};
use crate::domain::SourceKind;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Run only this source (arxiv, pubmed or openalex)
    #[arg(long)]
    pub source: Option<SourceKind>,

    /// Resume from existing checkpoints even if `global.resume` is off
    #[arg(long, conflicts_with = "restart")]
    pub resume: bool,

    /// Clear checkpoints of the selected sources before running
    #[arg(long)]
    pub restart: bool,

    /// Override the record ceiling of every selected source
    #[arg(long)]
    pub max_records: Option<u64>,
}

impl IngestArgs {
    /// Applies command-line overrides to the loaded configuration
    fn apply_overrides(&self, config: &mut IngestConfig) {
        if let Some(source) = self.source {
            tracing::info!(source = %source, "Restricting run to one source from CLI");
            config.enable_only(source);
        }
        if let Some(max_records) = self.max_records {
            tracing::info!(max_records, "Overriding max_records from CLI");
            for source in config.enabled_sources() {
                config.set_max_records(source, max_records);
            }
        }
    }

    /// Execute the ingest command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting ingest command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let sources = config.enabled_sources();
        if sources.is_empty() {
            println!("No sources enabled, nothing to ingest.");
            return Ok(0);
        }

        let mut orchestrator = match Orchestrator::new(config, shutdown_signal) {
            Ok(o) => o,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize ingestion");
                eprintln!("Failed to initialize ingestion: {e}");
                return Ok(2);
            }
        };

        if self.resume {
            orchestrator = orchestrator.with_resume(true);
        }
        if self.restart {
            orchestrator.clear_checkpoints().await?;
            orchestrator = orchestrator.with_resume(false);
        }

        println!("🚀 Ingesting from: {}", join(&sources));
        println!();

        let summary = orchestrator.run().await;
        print_summary(&summary);

        let exit_code = summary.exit_code();
        match exit_code {
            130 => {
                println!("⚠️  Ingestion interrupted. Progress saved.");
                println!("   Run the same command to resume from checkpoint.");
                tracing::info!("Ingestion interrupted by user signal");
            }
            0 => println!("✅ Ingestion completed successfully!"),
            _ => println!("⚠️  Ingestion completed with errors"),
        }
        Ok(exit_code)
    }
}

fn join(sources: &[SourceKind]) -> String {
    sources
        .iter()
        .map(SourceKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Ingestion Summary:");
    println!(
        "{:<10} {:>10} {:>8} {:>10} {:>8} {:>10}",
        "Source", "Records", "Batches", "Citations", "Errors", "Requests"
    );
    println!("{}", "-".repeat(61));
    for result in &summary.results {
        let requests = result
            .rate_limit_stats
            .as_ref()
            .map(|s| s.rate_limiter.total_requests.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:>10} {:>8} {:>10} {:>8} {:>10}",
            result.source.as_str(),
            result.records_ingested,
            result.batches,
            result.citations_count,
            result.errors.len(),
            requests
        );
    }
    println!("{}", "-".repeat(61));
    println!(
        "{:<10} {:>10} {:>8} {:>10}",
        "Total",
        summary.total_records(),
        summary.total_batches(),
        summary.total_citations()
    );
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    let errors = summary.errors();
    if !errors.is_empty() {
        println!("⚠️  Errors encountered:");
        for error in errors.iter().take(20) {
            println!("  - {error}");
        }
        if errors.len() > 20 {
            println!("  ... and {} more errors", errors.len() - 20);
        }
        println!();
    }
}
