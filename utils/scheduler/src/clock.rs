//! Time sources for the scheduler.

use core::cell::Cell;
use core::time::Duration;
use std::rc::Rc;
use std::time::Instant;

/// A monotonic time source.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock time measured from the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Default)]
struct ManualTime {
    now: Cell<Duration>,
    auto_advance: Cell<Duration>,
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep a handle while the
/// scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Rc<ManualTime>,
}

impl ManualClock {
    /// Creates a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.time.now.set(self.time.now.get() + by);
    }

    /// Makes every reading advance the clock by `step` afterwards.
    ///
    /// Useful to simulate work taking time: with a 1 ms step and a 5 ms
    /// slice, a task yields after a handful of `should_yield` checks.
    pub fn set_auto_advance(&self, step: Duration) {
        self.time.auto_advance.set(step);
    }

    /// Current reading without advancing.
    #[must_use]
    pub fn peek(&self) -> Duration {
        self.time.now.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let now = self.time.now.get();
        self.time.now.set(now + self.time.auto_advance.get());
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_millis(3));
        assert_eq!(clock.now(), Duration::from_millis(3));
    }

    #[test]
    fn auto_advance_applies_after_each_reading() {
        let clock = ManualClock::new();
        clock.set_auto_advance(Duration::from_millis(2));
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(clock.now(), Duration::from_millis(2));
        assert_eq!(clock.peek(), Duration::from_millis(4));
    }
}
