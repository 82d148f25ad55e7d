//! Reconnect delays: capped exponential backoff plus bounded jitter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff settings for one connection role.
///
/// `delay(attempt) = min(initial * 2^(attempt-1), max) + floor(capped * jitter * r)`
/// with `r` uniform in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// The exponential component, capped at `max_delay_ms`. Attempts are 1-based.
    pub fn capped_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        self.initial_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }

    /// Delay for `attempt` with an explicit random sample in `[0, 1)`.
    pub fn delay_with(&self, attempt: u32, sample: f64) -> Duration {
        let capped = self.capped_delay_ms(attempt);
        let sample = sample.clamp(0.0, 1.0 - f64::EPSILON);
        let jitter = (capped as f64 * self.jitter.max(0.0) * sample).floor() as u64;
        Duration::from_millis(capped + jitter)
    }

    /// Delay for `attempt` with a fresh random sample.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, rand::random::<f64>())
    }
}
