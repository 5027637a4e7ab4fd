//! Exponential backoff
//!
//! Shared by the watch loop (unbounded attempts, 1s doubling to 30s) and the
//! dispatcher (at most 5 attempts).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl Backoff {
    /// Doubling delay starting at `initial_delay`, capped at `max_delay`
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts: None,
        }
    }

    /// Limits the total number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-indexed)
    ///
    /// Returns `None` once no further attempt is allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        // 2^(attempt-1) * initial_delay, capped at max_delay
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self
            .initial_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

impl Default for Backoff {
    /// 1s doubling to 30s, unbounded
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(30))
    }
}
