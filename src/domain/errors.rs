//! Domain error types
//!
//! This module defines the error hierarchy for the ingestion engine.
//! Errors never expose third-party types: HTTP, XML and filesystem failures
//! are converted into the variants below at the boundary where they occur.

use thiserror::Error;

/// Main ingestion error type
///
/// This is the primary error type used throughout the library. Adapters
/// inspect [`IngestError::is_fatal_for_source`] to decide whether a failure
/// aborts the current source or is recorded and skipped.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Upstream API errors (after retries have been applied)
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Malformed upstream payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Staged file write failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Checkpoint persistence failures
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl IngestError {
    /// Whether this error must abort the source it occurred in.
    ///
    /// Staged files and checkpoints are what make a run resumable, so a
    /// failure in either stops the source; everything else is recorded
    /// and the fetch loop moves on.
    pub fn is_fatal_for_source(&self) -> bool {
        matches!(self, IngestError::Storage(_) | IngestError::Checkpoint(_))
    }
}

/// Upstream HTTP errors
///
/// The transient/permanent split drives the retry state machine in
/// [`crate::adapters::http::RetryableTransport`].
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Failed to connect to the upstream server
    #[error("Failed to connect to upstream: {0}")]
    ConnectionFailed(String),

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than 429)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// All attempts were used up
    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<UpstreamError>,
    },

    /// Response body could not be used
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// Transient errors are retried inside the transport; everything else
    /// is a permanent request error and surfaces immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::ConnectionFailed(_)
                | UpstreamError::Timeout(_)
                | UpstreamError::ServerError { .. }
                | UpstreamError::RateLimited { .. }
        )
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::ServerError { status, .. } | UpstreamError::ClientError { status, .. } => {
                Some(*status)
            }
            UpstreamError::RateLimited { .. } => Some(429),
            UpstreamError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for IngestError {
    fn from(err: toml::de::Error) -> Self {
        IngestError::Configuration(format!("TOML parse error: {err}"))
    }
}

// Conversion from XML reader errors
impl From<quick_xml::Error> for IngestError {
    fn from(err: quick_xml::Error) -> Self {
        IngestError::Parse(format!("XML error: {err}"))
    }
}
