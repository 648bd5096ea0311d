//! Scheduler configuration beyond the tree registry itself: coalescing
//! delay, reload timeout, log level, push-history polling cadence. All of
//! these have defaults so the core is runnable with zero configuration —
//! the config file (or environment) only needs to override what's unusual.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Tunables for the scheduler run loop. Defaults mirror the zero-delay
/// coalescing timer and unbounded reload wait described in §5 / §9.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Delay between the first `compareBuild` call in a burst and the flush
    /// that drains it. Zero is the literal "zero-delay timer" of §4.3; a
    /// small positive value widens the coalescing window at the cost of
    /// latency.
    pub flush_delay: Duration,
    /// Upper bound on how long a single reload buildset may run before it's
    /// treated as a failed completion (releases the Gate regardless). `None`
    /// means wait indefinitely, matching the spec's "the core does not
    /// cancel in-flight reloads."
    pub reload_timeout: Option<Duration>,
    /// Log verbosity passed to `tracing_subscriber`'s env filter when no
    /// `RUST_LOG` override is present.
    pub log_level: String,
    /// How often the production push-history client is allowed to poll its
    /// backing store for fresh data. Not consulted by the in-memory fakes.
    pub push_poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            flush_delay: Duration::ZERO,
            reload_timeout: None,
            log_level: "info".to_string(),
            push_poll_interval: Duration::from_secs(60),
        }
    }
}

/// On-disk shape of the optional scheduler config file (TOML). Every field
/// is optional; absent fields fall back to [`SchedulerConfig::default`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    flush_delay_ms: Option<u64>,
    reload_timeout_secs: Option<u64>,
    log_level: Option<String>,
    push_poll_interval_secs: Option<u64>,
}

impl SchedulerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = SchedulerConfig::default();
        if let Some(ms) = raw.flush_delay_ms {
            config.flush_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = raw.reload_timeout_secs {
            config.reload_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(level) = raw.log_level {
            config.log_level = level;
        }
        if let Some(secs) = raw.push_poll_interval_secs {
            config.push_poll_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_is_empty() {
        let config = SchedulerConfig::from_toml_str("", Path::new("scheduler.toml")).unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn overrides_only_the_fields_present() {
        let config = SchedulerConfig::from_toml_str(
            "flush-delay-ms = 250\nlog-level = \"debug\"\n",
            Path::new("scheduler.toml"),
        )
        .unwrap();

        assert_eq!(config.flush_delay, Duration::from_millis(250));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.reload_timeout, None);
        assert_eq!(
            config.push_poll_interval,
            SchedulerConfig::default().push_poll_interval
        );
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = SchedulerConfig::from_toml_str("not valid = = toml", Path::new("x.toml"));
        assert!(err.is_err());
    }
}
