//! Status command implementation
//!
//! This module implements the `status` command for displaying saved
//! checkpoints and what is already staged.

use crate::config::load_config;
use crate::core::state::{CheckpointStore, FileCheckpointStore};
use crate::core::storage::PartitionedWriter;
use crate::domain::SourceKind;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this source
    #[arg(long)]
    pub source: Option<SourceKind>,
}

impl StatusArgs {
    fn selected(&self) -> Vec<SourceKind> {
        match self.source {
            Some(source) => vec![source],
            None => SourceKind::ALL.to_vec(),
        }
    }

    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking ingestion status");

        println!("📊 Ingestion Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let store = FileCheckpointStore::new(&config.global.checkpoint_dir)?;
        let writer = PartitionedWriter::new(&config.global.raw_data_dir, config.global.compress)?;
        let selected = self.selected();

        let checkpoints: Vec<_> = store
            .list()
            .await?
            .into_iter()
            .filter(|c| selected.contains(&c.source))
            .collect();

        if checkpoints.is_empty() {
            println!("No checkpoints saved; the next run starts from the beginning.");
        } else {
            println!("Found {} checkpoint(s):", checkpoints.len());
            println!();
            println!(
                "{:<10} {:<12} {:>12} {:<25}",
                "Source", "Cursor", "Records", "Last Updated"
            );
            println!("{}", "-".repeat(62));
            for checkpoint in &checkpoints {
                println!(
                    "{:<10} {:<12} {:>12} {:<25}",
                    checkpoint.source.as_str(),
                    checkpoint.cursor,
                    checkpoint.records_processed,
                    checkpoint.last_updated.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        println!();

        println!("Staged data under {}:", writer.root().display());
        println!();
        println!(
            "{:<10} {:>8} {:>12} {:>11}",
            "Source", "Files", "Bytes", "Partitions"
        );
        println!("{}", "-".repeat(44));
        for source in selected {
            let stats = writer.stats(source)?;
            println!(
                "{:<10} {:>8} {:>12} {:>11}",
                source.as_str(),
                stats.file_count,
                stats.total_size_bytes,
                stats.partitions
            );
        }
        println!();
        Ok(0)
    }
}
