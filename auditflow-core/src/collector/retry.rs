//! Backoff policies for collection retries

use std::time::Duration;

/// Delay to wait after the `attempt`-th consecutive failure (1-based).
pub trait BackoffPolicy: Send + Sync {
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Geometric backoff capped at `max`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 1.5,
            max: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let delay = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

/// Retry immediately. Used by tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffPolicy for NoBackoff {
    fn next_delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}
