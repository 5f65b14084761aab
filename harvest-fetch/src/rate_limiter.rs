//! Request rate limiter.
//!
//! Combines a concurrency cap (a semaphore sized `calls_per_period`) with a
//! pacing floor: consecutive requests are spaced at least
//! `period / calls_per_period * safety_buffer` apart. The semaphore alone
//! lets fast-completing requests burst past the per-period rate.

use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::trace;

/// Paces requests to a source.
#[derive(Debug)]
pub struct RateLimiter {
    semaphore: Semaphore,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

/// Permission to issue one request.
///
/// Holding the permit counts against the concurrency cap; drop it when the
/// request completes.
#[must_use = "dropping the permit immediately releases the concurrency slot"]
#[derive(Debug)]
pub struct RatePermit<'a> {
    _permit: Option<SemaphorePermit<'a>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `calls_per_period` calls every `period`.
    ///
    /// `safety_buffer` stretches the minimum interval (1.1 = 10% margin);
    /// values below 1.0 are treated as 1.0.
    pub fn new(calls_per_period: u32, period: Duration, safety_buffer: f64) -> Self {
        let calls = calls_per_period.max(1);
        let min_interval = (period / calls).mul_f64(safety_buffer.max(1.0));

        Self {
            semaphore: Semaphore::new(calls as usize),
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self {
            semaphore: Semaphore::new(Semaphore::MAX_PERMITS),
            min_interval: Duration::ZERO,
            last_request: Mutex::new(None),
        }
    }

    /// Minimum spacing between consecutive requests.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the next request may be issued.
    pub async fn acquire(&self) -> RatePermit<'_> {
        // Never closed, so this only yields None if that changes.
        let permit = self.semaphore.acquire().await.ok();

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                trace!(wait_ms = wait.as_millis(), "Pacing request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());

        RatePermit { _permit: permit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_interval_includes_safety_buffer() {
        let limiter = RateLimiter::new(10, Duration::from_secs(1), 1.1);
        let interval = limiter.min_interval();
        assert!(interval >= Duration::from_millis(109));
        assert!(interval <= Duration::from_millis(111));
    }

    #[test]
    fn test_buffer_below_one_is_clamped() {
        let limiter = RateLimiter::new(4, Duration::from_secs(2), 0.5);
        assert_eq!(limiter.min_interval(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_sequential_acquires_are_spaced() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1), 1.0);

        let start = Instant::now();
        drop(limiter.acquire().await);
        drop(limiter.acquire().await);
        drop(limiter.acquire().await);
        let third = start.elapsed();
        drop(limiter.acquire().await);

        assert!(
            third >= Duration::from_secs(1),
            "third call issued after {third:?}"
        );
    }

    #[tokio::test]
    async fn test_first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10), 1.0);
        let start = Instant::now();
        drop(limiter.acquire().await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..50 {
            drop(limiter.acquire().await);
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
