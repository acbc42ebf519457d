//! Bounded exponential backoff

use std::time::Duration;

/// Exponential backoff state
///
/// The first delay after a reset is `initial`; each further delay doubles the
/// previous one, capped at `max`. Delays never decrease until [`reset`].
///
/// [`reset`]: Backoff::reset
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
            attempt: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.current = if self.attempt == 0 {
            self.initial
        } else {
            self.current.saturating_mul(2).min(self.max)
        };
        self.attempt = self.attempt.saturating_add(1);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }
}
