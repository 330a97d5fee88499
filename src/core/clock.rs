//! Simulated clock region.

use parking_lot::Mutex;

use crate::util::types::Tick;

/// Simulated time, guarded by its own lock.
///
/// Only the clock task advances it in production; every other task reads it.
#[derive(Debug, Default)]
pub struct SimClock {
    now: Mutex<Tick>,
}

impl SimClock {
    /// Create a clock starting at `start`.
    #[must_use]
    pub fn new(start: Tick) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Current tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        *self.now.lock()
    }

    /// Advance by one tick and return the new value.
    pub fn advance(&self) -> Tick {
        let mut now = self.now.lock();
        *now += 1;
        *now
    }

    /// Advance by `delta` ticks and return the new value.
    pub fn advance_by(&self, delta: Tick) -> Tick {
        let mut now = self.now.lock();
        *now = now.saturating_add(delta);
        *now
    }
}
