//! Outbound HTTP plumbing shared by every source
//!
//! - [`RateLimiter`] - per-source token bucket
//! - [`RetryableTransport`] - GET with rate limiting, retry/backoff and 429 handling
//! - [`HttpBackend`] - the single-request seam, implemented by [`ReqwestBackend`]

pub mod rate_limiter;
pub mod transport;

pub use rate_limiter::{RateLimiter, RateLimiterStats, MIN_REQUESTS_PER_SECOND};
pub use transport::{
    classify, HttpBackend, HttpResponse, ReqwestBackend, RetryPolicy, RetryState,
    RetryableTransport, TransportStats,
};
