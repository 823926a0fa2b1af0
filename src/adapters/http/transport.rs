//! Rate-limited HTTP GET with retry and backoff
//!
//! [`RetryableTransport`] drives an explicit state machine ([`RetryState`])
//! whose transitions are decided by [`RetryPolicy`]. The policy is pure, so
//! each transition can be tested without I/O; the transport only performs
//! the side effects (token acquisition, the request, sleeping, counters).
//!
//! The HTTP client itself sits behind [`HttpBackend`] so tests can script
//! upstream behavior.

use crate::adapters::http::rate_limiter::{RateLimiter, RateLimiterStats};
use crate::domain::errors::UpstreamError;
use crate::log_retry_attempt;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A fully read HTTP response
///
/// The body is read before the backend returns, so the underlying
/// connection is released on every path.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Raw `Retry-After` header value, if present
    pub retry_after: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// One GET request, no retries
///
/// Implementations return `Ok` for any HTTP status and `Err` only when no
/// response was received (connection failure or timeout).
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<HttpResponse, UpstreamError>;
}

/// reqwest-backed [`HttpBackend`]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(timeout: Duration) -> std::result::Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("scholarly-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                UpstreamError::ConnectionFailed(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<HttpResponse, UpstreamError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout(e.to_string())
    } else {
        UpstreamError::ConnectionFailed(e.to_string())
    }
}

/// States of a single logical request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryState {
    /// About to acquire a token and send attempt `attempt` (0-based)
    Attempting { attempt: u32, rate_limit_waits: u32 },
    /// Sleeping before the next attempt after a transient failure
    WaitingBackoff {
        attempt: u32,
        rate_limit_waits: u32,
        delay: Duration,
    },
    /// Sleeping on a 429; the attempt number is not advanced
    WaitingRateLimit {
        attempt: u32,
        rate_limit_waits: u32,
        delay: Duration,
    },
    Success,
    TerminalFailure,
}

impl RetryState {
    pub fn initial() -> Self {
        RetryState::Attempting {
            attempt: 0,
            rate_limit_waits: 0,
        }
    }

    /// State after a wait completes; other states are returned unchanged
    pub fn after_wait(self) -> Self {
        match self {
            RetryState::WaitingBackoff {
                attempt,
                rate_limit_waits,
                ..
            } => RetryState::Attempting {
                attempt: attempt + 1,
                rate_limit_waits,
            },
            RetryState::WaitingRateLimit {
                attempt,
                rate_limit_waits,
                ..
            } => RetryState::Attempting {
                attempt,
                rate_limit_waits: rate_limit_waits + 1,
            },
            other => other,
        }
    }
}

/// Retry parameters and transition rules
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for transient failures (not counting 429 waits)
    pub max_attempts: u32,
    /// Backoff before retry `n` (0-based) is `backoff_factor^n` seconds
    pub backoff_factor: f64,
    /// Consecutive 429 waits allowed per request
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            max_rate_limit_waits: 10,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor.powi(attempt as i32);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Transition out of `Attempting` given the attempt's classified outcome
    pub fn after_attempt(
        &self,
        attempt: u32,
        rate_limit_waits: u32,
        outcome: &std::result::Result<HttpResponse, UpstreamError>,
    ) -> RetryState {
        match outcome {
            Ok(_) => RetryState::Success,
            Err(UpstreamError::RateLimited { retry_after_secs }) => {
                if rate_limit_waits < self.max_rate_limit_waits {
                    RetryState::WaitingRateLimit {
                        attempt,
                        rate_limit_waits,
                        delay: Duration::from_secs(*retry_after_secs),
                    }
                } else {
                    RetryState::TerminalFailure
                }
            }
            Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                RetryState::WaitingBackoff {
                    attempt,
                    rate_limit_waits,
                    delay: self.backoff_delay(attempt),
                }
            }
            Err(_) => RetryState::TerminalFailure,
        }
    }
}

/// Maps a raw backend result onto success or the error taxonomy
pub fn classify(
    raw: std::result::Result<HttpResponse, UpstreamError>,
    default_retry_after: Duration,
) -> std::result::Result<HttpResponse, UpstreamError> {
    let response = raw?;
    match response.status {
        200..=399 => Ok(response),
        429 => Err(UpstreamError::RateLimited {
            retry_after_secs: parse_retry_after(response.retry_after.as_deref())
                .unwrap_or(default_retry_after)
                .as_secs(),
        }),
        status @ 500..=599 => Err(UpstreamError::ServerError {
            status,
            message: truncate(&response.body),
        }),
        status => Err(UpstreamError::ClientError {
            status,
            message: truncate(&response.body),
        }),
    }
}

/// `Retry-After` is either delta-seconds or an HTTP date
fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let value = value?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let secs = (at.with_timezone(&Utc) - Utc::now()).num_seconds().max(0);
    Some(Duration::from_secs(secs as u64))
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Transport counters plus the limiter's own
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportStats {
    pub total_retries: u64,
    pub total_errors: u64,
    pub rate_limiter: RateLimiterStats,
}

/// HTTP GET with rate limiting, retry/backoff and 429 handling
pub struct RetryableTransport {
    backend: Arc<dyn HttpBackend>,
    rate_limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    default_retry_after: Duration,
    total_retries: AtomicU64,
    total_errors: AtomicU64,
}

impl RetryableTransport {
    pub fn new(
        backend: Arc<dyn HttpBackend>,
        rate_limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            rate_limiter,
            policy,
            default_retry_after: Duration::from_secs(60),
            total_retries: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
        }
    }

    /// Wait applied to a 429 without a usable `Retry-After`
    pub fn with_default_retry_after(mut self, wait: Duration) -> Self {
        self.default_retry_after = wait;
        self
    }

    /// Sends a GET, retrying transient failures
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::ClientError`] for 4xx other than 429, without retrying
    /// - [`UpstreamError::RetriesExhausted`] carrying the last error once
    ///   attempts (or allowed 429 waits) run out
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<HttpResponse, UpstreamError> {
        let mut state = RetryState::initial();
        let mut attempts_made = 0;
        let mut last = None;

        loop {
            match state {
                RetryState::Attempting {
                    attempt,
                    rate_limit_waits,
                } => {
                    self.rate_limiter.acquire().await;
                    attempts_made = attempt + 1;
                    let outcome = classify(
                        self.backend.get(url, query).await,
                        self.default_retry_after,
                    );
                    state = self.policy.after_attempt(attempt, rate_limit_waits, &outcome);
                    last = Some(outcome);
                }
                RetryState::WaitingBackoff { attempt, delay, .. } => {
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    if let Some(Err(e)) = &last {
                        log_retry_attempt!(
                            attempt + 2,
                            self.policy.max_attempts,
                            delay.as_millis() as u64,
                            e
                        );
                    }
                    tokio::time::sleep(delay).await;
                    state = state.after_wait();
                }
                RetryState::WaitingRateLimit { delay, .. } => {
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(url, wait_secs = delay.as_secs(), "Rate limited by upstream");
                    tokio::time::sleep(delay).await;
                    state = state.after_wait();
                }
                RetryState::Success | RetryState::TerminalFailure => break,
            }
        }

        match last {
            Some(Ok(response)) => Ok(response),
            Some(Err(err)) => {
                self.total_errors.fetch_add(1, Ordering::Relaxed);
                if err.is_transient() {
                    tracing::error!(url, attempts = attempts_made, error = %err, "Request failed");
                    Err(UpstreamError::RetriesExhausted {
                        attempts: attempts_made,
                        last: Box::new(err),
                    })
                } else {
                    Err(err)
                }
            }
            None => Err(UpstreamError::InvalidResponse(format!(
                "No attempt was made for {url}"
            ))),
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub async fn stats(&self) -> TransportStats {
        TransportStats {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            rate_limiter: self.rate_limiter.stats().await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Backend that replays a fixed script of results
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<std::result::Result<HttpResponse, UpstreamError>>>,
        calls: AtomicU64,
    }

    impl ScriptedBackend {
        pub(crate) fn new(
            script: Vec<std::result::Result<HttpResponse, UpstreamError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU64::new(0),
            })
        }

        pub(crate) fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpBackend for ScriptedBackend {
        async fn get(
            &self,
            _url: &str,
            _query: &[(&str, String)],
        ) -> std::result::Result<HttpResponse, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::with_status(501, "script exhausted")))
        }
    }

    fn transport(backend: Arc<ScriptedBackend>, max_attempts: u32) -> RetryableTransport {
        RetryableTransport::new(
            backend,
            Arc::new(RateLimiter::new(1000.0, 10)),
            RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
        )
    }

    fn status(code: u16) -> std::result::Result<HttpResponse, UpstreamError> {
        Ok(HttpResponse::with_status(code, ""))
    }

    fn rate_limited(after: &str) -> std::result::Result<HttpResponse, UpstreamError> {
        Ok(HttpResponse {
            status: 429,
            retry_after: Some(after.to_string()),
            body: String::new(),
        })
    }

    #[test]
    fn test_policy_transitions() {
        let policy = RetryPolicy::default();
        let server = Err(UpstreamError::ServerError {
            status: 503,
            message: String::new(),
        });

        assert_eq!(
            policy.after_attempt(0, 0, &server),
            RetryState::WaitingBackoff {
                attempt: 0,
                rate_limit_waits: 0,
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            policy.after_attempt(1, 0, &server),
            RetryState::WaitingBackoff {
                attempt: 1,
                rate_limit_waits: 0,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(
            policy.after_attempt(2, 0, &server),
            RetryState::TerminalFailure
        );

        let client = Err(UpstreamError::ClientError {
            status: 404,
            message: String::new(),
        });
        assert_eq!(
            policy.after_attempt(0, 0, &client),
            RetryState::TerminalFailure
        );
        assert_eq!(
            policy.after_attempt(0, 0, &Ok(HttpResponse::ok(""))),
            RetryState::Success
        );
    }

    #[test]
    fn test_rate_limit_does_not_advance_attempt() {
        let policy = RetryPolicy::default();
        let limited = Err(UpstreamError::RateLimited {
            retry_after_secs: 5,
        });

        let waiting = policy.after_attempt(2, 0, &limited);
        assert_eq!(
            waiting,
            RetryState::WaitingRateLimit {
                attempt: 2,
                rate_limit_waits: 0,
                delay: Duration::from_secs(5)
            }
        );
        assert_eq!(
            waiting.after_wait(),
            RetryState::Attempting {
                attempt: 2,
                rate_limit_waits: 1
            }
        );
        assert_eq!(
            policy.after_attempt(2, 10, &limited),
            RetryState::TerminalFailure
        );
    }

    #[test]
    fn test_classify() {
        let d = Duration::from_secs(60);
        assert!(classify(status(200), d).is_ok());
        assert!(matches!(
            classify(status(503), d),
            Err(UpstreamError::ServerError { status: 503, .. })
        ));
        assert!(matches!(
            classify(status(400), d),
            Err(UpstreamError::ClientError { status: 400, .. })
        ));
        assert!(matches!(
            classify(status(429), d),
            Err(UpstreamError::RateLimited {
                retry_after_secs: 60
            })
        ));
        assert!(matches!(
            classify(rate_limited("7"), d),
            Err(UpstreamError::RateLimited {
                retry_after_secs: 7
            })
        ));
        assert!(matches!(
            classify(rate_limited("soon"), d),
            Err(UpstreamError::RateLimited {
                retry_after_secs: 60
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_two_server_errors() {
        let backend = ScriptedBackend::new(vec![status(503), status(503), Ok(HttpResponse::ok("done"))]);
        let transport = transport(backend.clone(), 3);

        let start = Instant::now();
        let response = transport.get("http://upstream/api", &[]).await.unwrap();

        assert_eq!(response.body, "done");
        assert_eq!(backend.calls(), 3);
        let stats = transport.stats().await;
        assert_eq!(stats.total_retries, 2);
        assert_eq!(stats.total_errors, 0);
        // backoff 2^0 + 2^1
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_without_consuming_attempt() {
        let backend = ScriptedBackend::new(vec![rate_limited("5"), Ok(HttpResponse::ok("ok"))]);
        let transport = transport(backend.clone(), 1);

        let start = Instant::now();
        let response = transport.get("http://upstream/api", &[]).await.unwrap();

        assert_eq!(response.body, "ok");
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(backend.calls(), 2);
        assert_eq!(transport.stats().await.total_retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_after_exhausting_attempts() {
        let backend = ScriptedBackend::new(vec![status(500), status(500), status(500), status(500)]);
        let transport = transport(backend.clone(), 3);

        let err = transport.get("http://upstream/api", &[]).await.unwrap_err();

        match err {
            UpstreamError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, UpstreamError::ServerError { status: 500, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.calls(), 3);
        let stats = transport.stats().await;
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.total_retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let backend = ScriptedBackend::new(vec![status(400), Ok(HttpResponse::ok("never"))]);
        let transport = transport(backend.clone(), 3);

        let err = transport.get("http://upstream/api", &[]).await.unwrap_err();

        assert!(matches!(err, UpstreamError::ClientError { status: 400, .. }));
        assert_eq!(backend.calls(), 1);
        assert_eq!(transport.stats().await.total_retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_errors_are_retried() {
        let backend = ScriptedBackend::new(vec![
            Err(UpstreamError::ConnectionFailed("reset".into())),
            Err(UpstreamError::Timeout("30s".into())),
            Ok(HttpResponse::ok("ok")),
        ]);
        let transport = transport(backend.clone(), 3);

        assert!(transport.get("http://upstream/api", &[]).await.is_ok());
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_acquires_a_token() {
        let backend = ScriptedBackend::new(vec![status(502), Ok(HttpResponse::ok("ok"))]);
        let limiter = Arc::new(RateLimiter::new(1000.0, 10));
        let transport = RetryableTransport::new(backend, limiter.clone(), RetryPolicy::default());

        transport.get("http://upstream/api", &[]).await.unwrap();
        assert_eq!(limiter.stats().await.total_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rate_limiting_is_bounded() {
        let script = (0..5).map(|_| rate_limited("1")).collect();
        let backend = ScriptedBackend::new(script);
        let transport = RetryableTransport::new(
            backend.clone(),
            Arc::new(RateLimiter::new(1000.0, 10)),
            RetryPolicy {
                max_rate_limit_waits: 2,
                ..RetryPolicy::default()
            },
        );

        let err = transport.get("http://upstream/api", &[]).await.unwrap_err();
        assert!(matches!(err, UpstreamError::RetriesExhausted { .. }));
        assert_eq!(backend.calls(), 3);
    }
}
