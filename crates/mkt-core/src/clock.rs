//! Time source
//!
//! The engine stamps `createdAt`, `updatedAt` and `stateMetadata.updatedAt`
//! from a [`Clock`] so tests and the simulator can control ordering.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
///
/// Every call to [`now`](Clock::now) advances by `tick` so consecutive
/// writes get distinct, increasing timestamps.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
    tick: Duration,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
            tick: Duration::milliseconds(1),
        }
    }

    /// Set the per-read increment
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Jump forward
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        *current += by;
    }

    /// Current value without advancing
    #[must_use]
    pub fn peek(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock();
        let now = *current;
        *current += self.tick;
        now
    }
}
