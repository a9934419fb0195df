//! Reconnect policy with jittered exponential back-off.

use std::time::Duration;

use rand::Rng;

/// Jitter bounds applied multiplicatively to every delay.
pub const JITTER_MIN: f64 = 0.8;
pub const JITTER_MAX: f64 = 1.2;

/// Controls how the client reconnects after an unexpected close.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBackoff {
    /// Delay before the first retry, before jitter.
    pub base_delay: Duration,
    /// Cap applied after jitter.
    pub max_delay: Duration,
    /// Retries per outage before settling at `disconnected`.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectBackoff {
    /// Delay for the given attempt number (1-indexed), with fresh jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.delay_with_jitter(attempt, jitter)
    }

    /// `min(base * 2^(attempt-1) * jitter, max_delay)`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = base_ms * 2f64.powi(exponent) * jitter;
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0).round() as u64)
    }

    /// Whether another retry may be scheduled after `attempts` retries.
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
