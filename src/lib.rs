// Scholarly Ingest - Bibliographic metadata ingestion engine
// Copyright (c) 2025 Scholarly Graph Contributors
// Licensed under the MIT License

//! # Scholarly Ingest
//!
//! Resumable ingestion of bibliographic metadata from arXiv, PubMed and
//! OpenAlex into a date-partitioned NDJSON staging area, read later by a
//! batch ETL job.
//!
//! ## Overview
//!
//! This library provides:
//! - **Fetching** pages from each upstream under a per-source rate limit, with
//!   retry, backoff and `Retry-After` handling
//! - **Parsing** Atom feeds, E-utilities XML and OpenAlex JSON into typed records
//! - **Staging** every batch as one NDJSON file (optionally gzipped) stamped
//!   with `_ingested_at`, `_source` and `_batch_id`
//! - **Checkpointing** after every batch so an interrupted run resumes where
//!   it stopped
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Orchestration, checkpoints, staging storage
//! - [`adapters`] - HTTP transport and the three source adapters
//! - [`domain`] - Records, identifiers, errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scholarly_ingest::config::load_config;
//! use scholarly_ingest::core::ingest::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("scholarly-ingest.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let summary = Orchestrator::new(config, shutdown_rx)?.run().await;
//!
//!     println!("Staged {} records", summary.total_records());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::IngestError`]. Storage and checkpoint
//! failures abort the affected source; everything else is recorded in that
//! source's result and the run moves on:
//!
//! ```rust,no_run
//! use scholarly_ingest::domain::IngestError;
//!
//! fn example() -> Result<(), IngestError> {
//!     let config = scholarly_ingest::config::load_config("scholarly-ingest.toml")?;
//!     println!("{:?}", config.enabled_sources());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
