use std::time::Duration;

/// Timing parameters of the attack scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Interval between two scheduler ticks.
    pub tick_period: Duration,
    /// How long before a wave's attack time its map is pre-locked.
    pub lock_window: Duration,
}

impl SchedulerConfig {
    /// Default tick interval.
    pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);
    /// Default pre-lock window.
    pub const DEFAULT_LOCK_WINDOW: Duration = Duration::from_secs(30);

    /// Creates a configuration with the provided timings.
    #[must_use]
    pub const fn new(tick_period: Duration, lock_window: Duration) -> Self {
        Self {
            tick_period,
            lock_window,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TICK_PERIOD, Self::DEFAULT_LOCK_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_tick_every_second_with_half_minute_window() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_period, Duration::from_secs(1));
        assert_eq!(config.lock_window, Duration::from_secs(30));
    }
}
