//! Core ingestion machinery
//!
//! # Modules
//!
//! - [`ingest`] - orchestration across sources and the run summary
//! - [`state`] - per-source checkpoints for resumable ingestion
//! - [`storage`] - date-partitioned NDJSON staging area
//!
//! # Ingestion Workflow
//!
//! For every enabled source:
//!
//! 1. **Resume**: read the source's checkpoint, if any
//! 2. **Fetch**: request the next page through the rate-limited transport
//! 3. **Parse**: turn the response into records, dropping entries without an id
//! 4. **Stage**: write the batch as one NDJSON file
//! 5. **Checkpoint**: persist the cursor once the batch file is in place
//! 6. **Finish**: clear the checkpoint after a run without errors
//!
//! # Example
//!
//! ```rust,no_run
//! use scholarly_ingest::config::load_config;
//! use scholarly_ingest::core::ingest::Orchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("scholarly-ingest.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let orchestrator = Orchestrator::new(config, shutdown_rx)?;
//! let summary = orchestrator.run().await;
//!
//! println!("Records: {}", summary.total_records());
//! std::process::exit(summary.exit_code());
//! # }
//! ```

pub mod ingest;
pub mod state;
pub mod storage;
