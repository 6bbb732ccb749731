//! Time source abstraction (spec §9, "Time source"). Two uses: `dt` in
//! seconds for the simulation tick, and millisecond deadlines for monitor
//! scheduling. Injected so tests can simulate elapsed time without sleeping.

use std::time::Instant;

pub trait Clock {
    /// Monotonic milliseconds since some fixed epoch (stable for the life
    /// of the clock instance). Used for monitor deadlines.
    fn now_ms(&self) -> u64;
}

/// Real wall-clock-independent clock backed by [`Instant`].
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Manually-advanced clock for deterministic tests.
#[cfg(test)]
pub struct SimClock {
    millis: std::cell::Cell<u64>,
}

#[cfg(test)]
impl SimClock {
    pub fn new() -> Self {
        Self {
            millis: std::cell::Cell::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.millis.set(self.millis.get() + ms);
    }
}

#[cfg(test)]
impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.millis.get()
    }
}
