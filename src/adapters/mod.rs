//! Upstream integrations
//!
//! - [`http`] - rate-limited, retrying HTTP transport shared by all sources
//! - [`sources`] - the arXiv, PubMed and OpenAlex adapters
//!
//! # Design Pattern
//!
//! Adapters only talk to the network through [`http::HttpBackend`], and only
//! touch disk through the checkpoint store and writer handed to them in
//! [`sources::AdapterContext`]. Tests substitute a scripted backend and
//! scratch directories.
//!
//! ```rust,no_run
//! use scholarly_ingest::adapters::http::{RateLimiter, ReqwestBackend, RetryPolicy, RetryableTransport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(ReqwestBackend::new(Duration::from_secs(30))?);
//! let limiter = Arc::new(RateLimiter::new(10.0, 1));
//! let transport = RetryableTransport::new(backend, limiter, RetryPolicy::default());
//!
//! let response = transport
//!     .get("https://api.openalex.org/works", &[("per-page", "1".to_string())])
//!     .await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```

pub mod http;
pub mod sources;
