//! Scheduler configuration.

use core::time::Duration;

use undertow_core::Priority;

/// How long a task may wait before it counts as expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Expired as soon as it is queued.
    Expired,
    /// Expires after the given delay.
    After(Duration),
    /// Never expires.
    Never,
}

/// Time slice and per-priority timeouts of a
/// [`CooperativeScheduler`](crate::CooperativeScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    time_slice: Duration,
    timeouts: [Timeout; 5],
}

impl SchedulerConfig {
    /// Creates the default configuration: a 5 ms slice, `Immediate` tasks
    /// already expired, `UserBlocking` after 250 ms, `Normal` after 5 s,
    /// `Low` after 10 s and `Idle` never.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            time_slice: Duration::from_millis(5),
            timeouts: [
                Timeout::Expired,
                Timeout::After(Duration::from_millis(250)),
                Timeout::After(Duration::from_secs(5)),
                Timeout::After(Duration::from_secs(10)),
                Timeout::Never,
            ],
        }
    }

    /// Sets how long a task runs before `should_yield` reports `true`.
    #[must_use]
    pub const fn with_time_slice(mut self, time_slice: Duration) -> Self {
        self.time_slice = time_slice;
        self
    }

    /// Overrides the timeout of one priority.
    #[must_use]
    pub const fn with_timeout(mut self, priority: Priority, timeout: Timeout) -> Self {
        self.timeouts[index(priority)] = timeout;
        self
    }

    /// The configured time slice.
    #[must_use]
    pub const fn time_slice(&self) -> Duration {
        self.time_slice
    }

    /// The timeout of `priority`.
    #[must_use]
    pub const fn timeout(&self, priority: Priority) -> Timeout {
        self.timeouts[index(priority)]
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

const fn index(priority: Priority) -> usize {
    match priority {
        Priority::Immediate => 0,
        Priority::UserBlocking => 1,
        Priority::Normal => 2,
        Priority::Low => 3,
        Priority::Idle => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_priority_order() {
        let config = SchedulerConfig::default();
        assert_eq!(config.time_slice(), Duration::from_millis(5));
        assert_eq!(config.timeout(Priority::Immediate), Timeout::Expired);
        assert_eq!(
            config.timeout(Priority::UserBlocking),
            Timeout::After(Duration::from_millis(250))
        );
        assert_eq!(config.timeout(Priority::Idle), Timeout::Never);
    }

    #[test]
    fn overrides_touch_only_their_priority() {
        let config = SchedulerConfig::new().with_timeout(Priority::Low, Timeout::Never);
        assert_eq!(config.timeout(Priority::Low), Timeout::Never);
        assert_eq!(config.timeout(Priority::Normal), Timeout::After(Duration::from_secs(5)));
    }
}
