//! Domain models and types.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Identifiers** ([`SourceKind`], [`BatchId`])
//! - **Source records** ([`ArxivRecord`], [`PubmedRecord`], [`OpenAlexRecord`], [`RawRecord`])
//! - **Error types** ([`IngestError`], [`UpstreamError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible library operations return [`Result<T, IngestError>`]:
//!
//! ```rust
//! use scholarly_ingest::domain::{IngestError, Result};
//!
//! fn example() -> Result<()> {
//!     let _config = scholarly_ingest::config::load_config("ingest.toml")?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod errors;
pub mod ids;
pub mod record;
pub mod result;

pub use errors::{IngestError, UpstreamError};
pub use ids::{BatchId, SourceKind};
pub use record::{
    ArxivRecord, Author, Concept, Link, MeshTerm, OpenAlexAuthor, OpenAlexRecord, PubmedRecord,
    RawRecord, Venue,
};
pub use result::Result;
