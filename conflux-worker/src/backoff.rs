//! Exponential backoff with jitter between empty polls.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Delay before the next poll: `base * 2^attempt`, capped at `max`, plus
    /// up to a quarter of that again as jitter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let capped = self.base.saturating_mul(factor).min(self.max);
        let jitter_ms = capped.as_millis() as u64 / 4;
        let jitter = rand::thread_rng().gen_range(0..=jitter_ms);
        self.attempt = self.attempt.saturating_add(1);
        capped + Duration::from_millis(jitter)
    }

    /// Back to `base` after messages arrive.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
