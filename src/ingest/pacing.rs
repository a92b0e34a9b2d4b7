/// Fixed-delay rate limiter for outbound weather API calls.
///
/// Each `acquire` reserves the next release slot, spaced `interval` after
/// the previous one, then sleeps until that slot. The first call goes
/// through immediately. Because slots are reserved under a short lock and
/// the sleep happens after it is released, the same limiter can be shared
/// (via `Arc`) by several workers without exceeding the provider's rate.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// A limiter that never waits.
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reserves the next slot and returns how long the caller must wait for it.
    fn reserve(&self) -> Duration {
        let now = Instant::now();
        let mut next = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.interval);

        slot.saturating_duration_since(now)
    }

    /// Blocks until the caller may make its next external call.
    pub fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}
