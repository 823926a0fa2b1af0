//! Token bucket rate limiter
//!
//! One limiter per source. Tokens refill continuously from the exact elapsed
//! time, so fractional rates such as 0.33 req/s are honored precisely.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Slowest rate a limiter accepts: one request every 1000 seconds
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Cumulative limiter statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub total_wait_secs: f64,
    pub avg_wait_secs: f64,
    pub requests_per_second: f64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    total_requests: u64,
    total_wait: Duration,
}

/// Token bucket throttle
///
/// The whole acquisition, including any wait, happens inside one critical
/// section: concurrent callers queue on the lock and are released one token
/// apart.
///
/// # Example
///
/// ```no_run
/// use scholarly_ingest::adapters::http::RateLimiter;
///
/// # async fn example() {
/// let limiter = RateLimiter::new(0.33, 1);
/// let waited = limiter.acquire().await;
/// println!("waited {waited:?}");
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_second: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Creates a full bucket of `burst_size` tokens
    ///
    /// A `burst_size` of zero is treated as one. A rate that is not a
    /// positive finite number falls back to [`MIN_REQUESTS_PER_SECOND`].
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        let requests_per_second = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second.max(MIN_REQUESTS_PER_SECOND)
        } else {
            tracing::warn!(
                requests_per_second,
                fallback = MIN_REQUESTS_PER_SECOND,
                "Invalid rate limit, using the minimum rate"
            );
            MIN_REQUESTS_PER_SECOND
        };
        let capacity = f64::from(burst_size.max(1));
        Self {
            requests_per_second,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                total_requests: 0,
                total_wait: Duration::ZERO,
            }),
        }
    }

    /// Blocks until a token is available and returns how long it waited
    pub async fn acquire(&self) -> Duration {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens =
            (state.tokens + elapsed.as_secs_f64() * self.requests_per_second).min(self.capacity);
        state.last_refill = now;

        let wait = if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Duration::ZERO
        } else {
            let wait = Duration::from_secs_f64((1.0 - state.tokens) / self.requests_per_second);
            tokio::time::sleep(wait).await;
            // The token that accrued during the wait is spent; refill resumes
            // from the instant it became available.
            state.tokens = 0.0;
            state.last_refill = now + wait;
            wait
        };

        state.total_requests += 1;
        state.total_wait += wait;
        wait
    }

    /// Tokens currently in the bucket, without refilling
    pub async fn available_tokens(&self) -> f64 {
        self.state.lock().await.tokens
    }

    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock().await;
        let total_wait_secs = state.total_wait.as_secs_f64();
        RateLimiterStats {
            total_requests: state.total_requests,
            total_wait_secs,
            avg_wait_secs: total_wait_secs / state.total_requests.max(1) as f64,
            requests_per_second: self.requests_per_second,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_free() {
        let limiter = RateLimiter::new(1.0, 3);
        for _ in 0..3 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert!(limiter.acquire().await > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_acquisitions_respect_rate() {
        let (rps, burst, n) = (2.0, 2u32, 10u32);
        let limiter = RateLimiter::new(rps, burst);

        let start = Instant::now();
        for _ in 0..n {
            limiter.acquire().await;
            let tokens = limiter.available_tokens().await;
            assert!((0.0..=f64::from(burst)).contains(&tokens));
        }
        let elapsed = start.elapsed().as_secs_f64();
        let lower = f64::from(n - burst) / rps;
        assert!(elapsed >= lower - 0.01, "elapsed {elapsed} < {lower}");
        assert!(elapsed <= lower + 0.1, "elapsed {elapsed} too long");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_rate() {
        let limiter = RateLimiter::new(0.5, 1);
        limiter.acquire().await;
        let waited = limiter.acquire().await;
        assert!((waited.as_secs_f64() - 2.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_refills_to_capacity_only() {
        let limiter = RateLimiter::new(10.0, 2);
        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert!(limiter.acquire().await > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(4.0, 1));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // first is free, remaining four are 0.25s apart
        assert!(start.elapsed().as_secs_f64() >= 1.0 - 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_rates_fall_back_to_minimum() {
        for rps in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let limiter = RateLimiter::new(rps, 1);
            assert_eq!(limiter.requests_per_second(), MIN_REQUESTS_PER_SECOND);

            assert_eq!(limiter.acquire().await, Duration::ZERO);
            let waited = limiter.acquire().await;
            assert!((waited.as_secs_f64() - 1000.0).abs() < 0.01);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats() {
        let limiter = RateLimiter::new(1.0, 1);
        limiter.acquire().await;
        limiter.acquire().await;

        let stats = limiter.stats().await;
        assert_eq!(stats.total_requests, 2);
        assert!((stats.total_wait_secs - 1.0).abs() < 0.01);
        assert!((stats.avg_wait_secs - 0.5).abs() < 0.01);
        assert_eq!(stats.requests_per_second, 1.0);
    }
}
