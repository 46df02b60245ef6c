use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use territory_defense_system_scheduler::SchedulerConfig;

/// Settings read from the optional configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Settings {
    engine: EngineSettings,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EngineSettings {
    tick_period_ms: u64,
    lock_window_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            tick_period_ms: u64::try_from(defaults.tick_period.as_millis()).unwrap_or(u64::MAX),
            lock_window_secs: defaults.lock_window.as_secs(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`, or returns the defaults without one.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing configuration {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        let _ = ensure_tick_period(settings.engine.tick_period_ms)?;
        Ok(settings)
    }

    /// Scheduler timings with command-line overrides applied.
    pub(crate) fn scheduler_config(
        &self,
        tick_period_ms: Option<u64>,
        lock_window_secs: Option<u64>,
    ) -> Result<SchedulerConfig> {
        let tick_period_ms =
            ensure_tick_period(tick_period_ms.unwrap_or(self.engine.tick_period_ms))?;
        Ok(SchedulerConfig::new(
            Duration::from_millis(tick_period_ms),
            Duration::from_secs(lock_window_secs.unwrap_or(self.engine.lock_window_secs)),
        ))
    }
}

fn ensure_tick_period(millis: u64) -> Result<u64> {
    anyhow::ensure!(millis > 0, "engine.tick_period_ms must be positive");
    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let settings = Settings::load(None).expect("defaults");
        assert_eq!(
            settings.scheduler_config(None, None).expect("config"),
            SchedulerConfig::default()
        );
    }

    #[test]
    fn engine_table_overrides_defaults() {
        let settings = Settings::parse("[engine]\ntick_period_ms = 250\n").expect("parse");
        let config = settings.scheduler_config(None, None).expect("config");
        assert_eq!(config.tick_period, Duration::from_millis(250));
        assert_eq!(config.lock_window, Duration::from_secs(30));
    }

    #[test]
    fn flags_override_the_file() {
        let settings = Settings::parse("[engine]\nlock_window_secs = 5\n").expect("parse");
        let config = settings
            .scheduler_config(Some(20), Some(60))
            .expect("config");
        assert_eq!(config.tick_period, Duration::from_millis(20));
        assert_eq!(config.lock_window, Duration::from_secs(60));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::parse("[engine]\ntick = 3\n").is_err());
        assert!(Settings::parse("[engine]\ntick_period_ms = 0\n").is_err());
    }

    #[test]
    fn zero_tick_period_flag_is_rejected_like_the_file() {
        let settings = Settings::default();
        assert!(settings.scheduler_config(Some(0), None).is_err());
        assert!(settings.scheduler_config(Some(1), None).is_ok());
    }
}
