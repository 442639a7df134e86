//! Windowed token bucket.
//!
//! The bucket holds at most `rate` tokens. Refill is computed lazily on each
//! check: once a full window has elapsed since the last refill the bucket is
//! reset to exactly `rate`. Unused tokens never carry over into the next
//! window, and a long idle period refills only once.

use std::time::{Duration, Instant};

/// Length of one refill window.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: u32,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket allowing `rate` consumptions per window.
    pub fn new(rate: u32) -> Self {
        Self::new_at(rate, Instant::now())
    }

    pub fn new_at(rate: u32, now: Instant) -> Self {
        Self {
            rate,
            tokens: rate,
            last_refill: now,
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Tokens left in the current window, without refilling.
    pub fn available(&self) -> u32 {
        self.tokens
    }

    pub fn try_consume(&mut self) -> bool {
        self.try_consume_at(Instant::now())
    }

    /// Refill if a window has elapsed by `now`, then take one token if any remain.
    pub fn try_consume_at(&mut self, now: Instant) -> bool {
        self.refill_at(now);
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    fn refill_at(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_refill) >= WINDOW {
            self.tokens = self.rate;
            self.last_refill = now;
        }
    }
}
