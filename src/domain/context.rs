//! Error context extension trait
//!
//! Similar to `anyhow::Context`, but the [`IngestError`] variant is kept, so
//! a storage or checkpoint failure stays fatal for its source after context
//! has been added.
//!
//! # Examples
//!
//! ```rust
//! use scholarly_ingest::domain::Result;
//! use scholarly_ingest::domain::context::ResultExt;
//!
//! fn read_file(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .context(format!("Failed to read file: {}", path))
//! }
//! ```

use crate::domain::errors::IngestError;
use crate::domain::result::Result;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error (eagerly evaluated)
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error, computing it only on failure
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<IngestError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| prefixed(e.into(), &context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| prefixed(e.into(), &f()))
    }
}

fn prefixed(error: IngestError, context: &dyn std::fmt::Display) -> IngestError {
    match error {
        IngestError::Configuration(m) => IngestError::Configuration(format!("{context}: {m}")),
        IngestError::Parse(m) => IngestError::Parse(format!("{context}: {m}")),
        IngestError::Storage(m) => IngestError::Storage(format!("{context}: {m}")),
        IngestError::Checkpoint(m) => IngestError::Checkpoint(format!("{context}: {m}")),
        IngestError::Validation(m) => IngestError::Validation(format!("{context}: {m}")),
        IngestError::Serialization(m) => IngestError::Serialization(format!("{context}: {m}")),
        IngestError::Io(m) => IngestError::Io(format!("{context}: {m}")),
        IngestError::Other(m) => IngestError::Other(format!("{context}: {m}")),
        // Upstream errors carry structured status data; wrap the rendered form
        other @ IngestError::Upstream(_) => IngestError::Other(format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::UpstreamError;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_context_keeps_variant() {
        let result: Result<()> = Err(IngestError::Checkpoint("disk full".to_string()));
        let err = result.context("Checkpoint after batch_00000100").unwrap_err();

        assert!(err.is_fatal_for_source());
        assert_eq!(
            err.to_string(),
            "Checkpoint error: Checkpoint after batch_00000100: disk full"
        );
    }

    #[test]
    fn test_with_context_is_lazy() {
        let called = AtomicBool::new(false);
        let result: Result<u32> = Ok(7);
        let value = result
            .with_context(|| {
                called.store(true, Ordering::SeqCst);
                "never built"
            })
            .unwrap();

        assert_eq!(value, 7);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_context_converts_foreign_errors() {
        let io = std::fs::read_to_string("/nonexistent/scholarly/file");
        let err = io.context("Reading fixture").unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
        assert!(err.to_string().contains("Reading fixture"));
    }

    #[test]
    fn test_upstream_errors_are_not_fatal_after_context() {
        let result: std::result::Result<(), UpstreamError> =
            Err(UpstreamError::ClientError {
                status: 400,
                message: "bad term".to_string(),
            });
        let err = result.context("ESearch at offset 5").unwrap_err();
        assert!(!err.is_fatal_for_source());
        assert!(err.to_string().contains("400"));
    }
}
