//! Retry and pacing policy for page fetches.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Bounded attempt policy for a single page fetch. No unbounded retries:
/// the attempt count is the implicit fetch timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

/// Uniform random delay bounds for the pause between page fetches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayBounds {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayBounds {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        Self {
            min_secs: min_secs.max(0.0),
            max_secs: max_secs.max(min_secs).max(0.0),
        }
    }

    /// Draw one delay from the configured range.
    pub fn sample(&self) -> Duration {
        let secs = if self.max_secs > self.min_secs {
            rand::rng().random_range(self.min_secs..=self.max_secs)
        } else {
            self.min_secs
        };
        Duration::from_secs_f64(secs)
    }
}

impl Default for DelayBounds {
    fn default() -> Self {
        Self::new(2.0, 4.0)
    }
}

/// Pause between page fetches. The delay bounds load on the external source;
/// it is backpressure, not a correctness requirement, so tests substitute
/// the no-op implementation.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Tokio-backed sleeper used in production.
#[derive(Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately, for tests.
#[derive(Debug, Default)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}
