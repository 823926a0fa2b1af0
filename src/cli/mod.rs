//! CLI interface and argument parsing
//!
//! This module provides the command-line interface using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Scholarly Ingest - bibliographic metadata ingestion
#[derive(Parser, Debug)]
#[command(name = "scholarly-ingest")]
#[command(version, about, long_about = None)]
#[command(author = "Scholarly Graph Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "scholarly-ingest.toml",
        env = "SCHOLARLY_CONFIG"
    )]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "SCHOLARLY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch records from the enabled sources into the staging area
    Ingest(commands::ingest::IngestArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show checkpoints and staged partitions
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceKind;

    #[test]
    fn test_cli_parse_ingest() {
        let cli = Cli::parse_from(["scholarly-ingest", "ingest"]);
        assert_eq!(cli.config, "scholarly-ingest.toml");
        assert!(matches!(cli.command, Commands::Ingest(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["scholarly-ingest", "--config", "custom.toml", "ingest"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["scholarly-ingest", "--log-level", "debug", "ingest"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_ingest_options() {
        let cli = Cli::parse_from([
            "scholarly-ingest",
            "ingest",
            "--source",
            "pubmed",
            "--restart",
            "--max-records",
            "50",
        ]);
        match cli.command {
            Commands::Ingest(args) => {
                assert_eq!(args.source, Some(SourceKind::Pubmed));
                assert!(args.restart);
                assert!(!args.resume);
                assert_eq!(args.max_records, Some(50));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_resume_with_restart() {
        let parsed =
            Cli::try_parse_from(["scholarly-ingest", "ingest", "--resume", "--restart"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_source() {
        let parsed = Cli::try_parse_from(["scholarly-ingest", "ingest", "--source", "scopus"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["scholarly-ingest", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["scholarly-ingest", "status"]);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["scholarly-ingest", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
