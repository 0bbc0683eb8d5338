use std::time::{Duration, Instant};

/// Minimum spacing between two actions, owned by whoever performs them
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Time left before the next action is allowed, zero when it may happen now
    pub fn check(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => (last + self.min_interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Record an action at `now` if the interval has passed
    pub fn acquire(&mut self, now: Instant) -> bool {
        if !self.check(now).is_zero() {
            return false;
        }
        self.last = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
