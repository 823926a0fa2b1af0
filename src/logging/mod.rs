//! Logging and observability
//!
//! Structured logging through `tracing`, with console output and optional
//! rotated JSON files.
//!
//! # Example
//!
//! ```no_run
//! use scholarly_ingest::logging::init_logging;
//! use scholarly_ingest::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(source = "arxiv", "Starting ingestion");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a staged batch
///
/// # Example
///
/// ```no_run
/// use scholarly_ingest::log_batch_written;
///
/// log_batch_written!("arxiv", "batch_00000100", 100, 200);
/// ```
#[macro_export]
macro_rules! log_batch_written {
    ($source:expr, $batch_id:expr, $records:expr, $total:expr) => {
        tracing::info!(
            source = %$source,
            batch_id = %$batch_id,
            records = $records,
            total = $total,
            "Batch written"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use scholarly_ingest::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, 4000u64, "Server error: 503");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying request"
        );
    };
}

/// Log a record dropped during parsing
///
/// # Example
///
/// ```no_run
/// use scholarly_ingest::log_skipped_record;
///
/// log_skipped_record!("pubmed", "missing PMID");
/// ```
#[macro_export]
macro_rules! log_skipped_record {
    ($source:expr, $reason:expr) => {{
        tracing::warn!(source = %$source, reason = %$reason, "Skipping record");
    }};
}
