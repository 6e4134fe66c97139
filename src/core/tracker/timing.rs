//! Randomized delays and bounded backoff
//!
//! Every wait in a tracking cycle goes through a [`Sleeper`], so all of them
//! are cooperative yield points and tests can record them instead of sleeping.

use rand::Rng;
use std::sync::Mutex;
use std::time::Duration;

/// Async sleep abstraction for dependency injection and testing
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested sleeps without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Source of uniform random values
pub trait JitterSource: Send + Sync {
    /// Uniform value in `[low, high]`; returns `low` when the range is empty
    fn uniform(&self, low: f64, high: f64) -> f64;
}

/// Thread-local RNG jitter
#[derive(Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn uniform(&self, low: f64, high: f64) -> f64 {
        if !(high > low) {
            return low;
        }
        rand::rng().random_range(low..=high)
    }
}

/// Deterministic jitter: always picks the same fraction of the range
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn uniform(&self, low: f64, high: f64) -> f64 {
        if !(high > low) {
            return low;
        }
        low + (high - low) * self.0.clamp(0.0, 1.0)
    }
}

/// Exponential backoff with additive `[0, 1)` second jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: f64,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base: f64, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Wait before retrying after `attempt` (0-based): `base^attempt + U(0,1)`
    ///
    /// A server-supplied `Retry-After` (seconds) replaces the computed value.
    pub fn delay(&self, attempt: u32, retry_after: Option<f64>, jitter: &dyn JitterSource) -> Duration {
        let secs = match retry_after {
            Some(hint) if hint.is_finite() && hint >= 0.0 => hint,
            _ => self.base.powi(attempt as i32) + jitter.uniform(0.0, 1.0),
        };
        Duration::from_secs_f64(secs.clamp(0.0, 3600.0))
    }
}

/// Anti-fingerprinting pre-call delay drawn uniformly from `[min, max]` seconds
pub fn pre_call_delay(min_secs: f64, max_secs: f64, jitter: &dyn JitterSource) -> Duration {
    let secs = jitter.uniform(min_secs.max(0.0), max_secs.max(0.0));
    Duration::from_secs_f64(secs.max(0.0))
}

/// Parse a `Retry-After` header given in delta-seconds
pub fn parse_retry_after(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}
