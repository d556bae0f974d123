//! Per-provider request throttling.
//!
//! External directories and registries are rate- and ban-sensitive, so every
//! outbound call to a provider goes through that provider's [`RateLimiter`].
//! The limiter serializes callers and enforces a minimum gap between calls;
//! concurrency across *different* providers is unaffected.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};

/// Throttles calls to a single external provider/domain.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter enforcing `min_interval` between calls.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Create a limiter from a millisecond interval.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Wait until the provider may be called again.
    ///
    /// The internal lock is held across the sleep, so concurrent callers
    /// queue up and drain one interval apart.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// The enforced minimum interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn enforces_minimum_gap() {
        let limiter = RateLimiter::from_millis(500);

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // First call is free; the next two each wait 500ms of virtual time.
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_sleeps() {
        let limiter = RateLimiter::from_millis(0);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_drain_one_interval_apart() {
        let limiter = Arc::new(RateLimiter::from_millis(200));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("task");
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
