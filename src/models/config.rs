//! Probe configuration data model and validation

use crate::error::{AppError, Result};
use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the scheduler does when a latency probe cannot be built or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the daemon with the probe error
    #[default]
    Fatal,
    /// Log the error and wait for the next tick
    Skip,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Fatal => write!(f, "fatal"),
            FailurePolicy::Skip => write!(f, "skip"),
        }
    }
}

/// Probe daemon configuration, immutable once the scheduler starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Seconds between latency probes
    #[serde(default = "default_latency_interval")]
    pub latency_interval_seconds: u64,

    /// Seconds between throughput probes
    #[serde(default = "default_throughput_interval")]
    pub throughput_interval_seconds: u64,

    /// Host the latency probe sends echoes to
    #[serde(default = "default_ping_target")]
    pub ping_target: String,

    /// Echo requests per latency probe
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// Speedtest server id; empty selects the fastest server
    #[serde(default)]
    pub speedtest_server: String,

    /// HTTP timeout applied inside the speedtest prober
    #[serde(default = "default_speedtest_timeout")]
    pub speedtest_timeout_seconds: u64,

    /// Reaction to latency probe failures
    #[serde(default)]
    pub latency_failure_policy: FailurePolicy,

    /// Consecutive failed speedtest cycles tolerated before giving up
    #[serde(default)]
    pub speedtest_failure_limit: Option<u32>,

    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Colored level markers in console output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Debug-level logging
    #[serde(default)]
    pub debug: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            latency_interval_seconds: default_latency_interval(),
            throughput_interval_seconds: default_throughput_interval(),
            ping_target: default_ping_target(),
            ping_count: default_ping_count(),
            speedtest_server: String::new(),
            speedtest_timeout_seconds: default_speedtest_timeout(),
            latency_failure_policy: FailurePolicy::default(),
            speedtest_failure_limit: None,
            log_format: LogFormat::default(),
            enable_color: default_enable_color(),
            debug: false,
        }
    }
}

impl ProbeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with the given intervals and defaults elsewhere
    pub fn with_intervals(latency_interval_seconds: u64, throughput_interval_seconds: u64) -> Self {
        Self {
            latency_interval_seconds,
            throughput_interval_seconds,
            ..Self::default()
        }
    }

    pub fn latency_interval(&self) -> Duration {
        Duration::from_secs(self.latency_interval_seconds)
    }

    pub fn throughput_interval(&self) -> Duration {
        Duration::from_secs(self.throughput_interval_seconds)
    }

    pub fn speedtest_timeout(&self) -> Duration {
        Duration::from_secs(self.speedtest_timeout_seconds)
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        let max_interval = crate::defaults::MAX_INTERVAL_SECS;

        if self.latency_interval_seconds == 0 {
            return Err(AppError::config("Ping interval must be greater than 0"));
        }
        if self.latency_interval_seconds > max_interval {
            return Err(AppError::config(format!(
                "Ping interval cannot exceed {} seconds",
                max_interval
            )));
        }

        if self.throughput_interval_seconds == 0 {
            return Err(AppError::config("Speedtest interval must be greater than 0"));
        }
        if self.throughput_interval_seconds > max_interval {
            return Err(AppError::config(format!(
                "Speedtest interval cannot exceed {} seconds",
                max_interval
            )));
        }

        let target = self.ping_target.trim();
        if target.is_empty() {
            return Err(AppError::config("Ping target cannot be empty"));
        }
        if target.contains(char::is_whitespace) || target.contains("://") {
            return Err(AppError::config(format!(
                "Ping target must be a bare host name or IP address: '{}'",
                self.ping_target
            )));
        }

        if self.ping_count == 0 {
            return Err(AppError::config("Ping count must be greater than 0"));
        }
        if self.ping_count > crate::defaults::MAX_PING_COUNT {
            return Err(AppError::config(format!(
                "Ping count cannot exceed {}",
                crate::defaults::MAX_PING_COUNT
            )));
        }

        if self.speedtest_timeout_seconds == 0 {
            return Err(AppError::config("Speedtest timeout must be greater than 0"));
        }
        if self.speedtest_timeout_seconds > 300 {
            return Err(AppError::config("Speedtest timeout cannot exceed 300 seconds"));
        }

        if self.speedtest_failure_limit == Some(0) {
            return Err(AppError::config(
                "Speedtest failure limit must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_latency_interval() -> u64 {
    crate::defaults::DEFAULT_PING_INTERVAL_SECS
}

fn default_throughput_interval() -> u64 {
    crate::defaults::DEFAULT_SPEEDTEST_INTERVAL_SECS
}

fn default_ping_target() -> String {
    crate::defaults::DEFAULT_PING_TARGET.to_string()
}

fn default_ping_count() -> u32 {
    crate::defaults::DEFAULT_PING_COUNT
}

fn default_speedtest_timeout() -> u64 {
    crate::defaults::DEFAULT_SPEEDTEST_TIMEOUT.as_secs()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.latency_interval_seconds, 5);
        assert_eq!(config.throughput_interval_seconds, 120);
        assert_eq!(config.ping_target, "www.google.com");
        assert_eq!(config.ping_count, 3);
        assert!(config.speedtest_server.is_empty());
        assert_eq!(config.latency_failure_policy, FailurePolicy::Fatal);
    }

    #[test]
    fn test_zero_intervals_invalid() {
        let config = ProbeConfig::with_intervals(0, 120);
        assert!(config.validate().is_err());

        let config = ProbeConfig::with_intervals(5, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_upper_bound() {
        let config = ProbeConfig::with_intervals(crate::defaults::MAX_INTERVAL_SECS + 1, 120);
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("Ping interval cannot exceed"));
    }

    #[test]
    fn test_empty_ping_target_invalid() {
        let config = ProbeConfig {
            ping_target: "   ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_url_ping_target_invalid() {
        let config = ProbeConfig {
            ping_target: "https://www.google.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ping_count_bounds() {
        let mut config = ProbeConfig::default();
        config.ping_count = 0;
        assert!(config.validate().is_err());
        config.ping_count = 101;
        assert!(config.validate().is_err());
        config.ping_count = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_failure_limit_invalid() {
        let config = ProbeConfig {
            speedtest_failure_limit: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = ProbeConfig::with_intervals(7, 90);
        assert_eq!(config.latency_interval(), Duration::from_secs(7));
        assert_eq!(config.throughput_interval(), Duration::from_secs(90));
        assert_eq!(config.speedtest_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: ProbeConfig =
            serde_json::from_str(r#"{"latency_interval_seconds": 10, "latency_failure_policy": "skip"}"#).unwrap();
        assert_eq!(config.latency_interval_seconds, 10);
        assert_eq!(config.throughput_interval_seconds, 120);
        assert_eq!(config.latency_failure_policy, FailurePolicy::Skip);
    }

    proptest! {
        #[test]
        fn prop_positive_intervals_are_valid(
            latency in 1u64..=crate::defaults::MAX_INTERVAL_SECS,
            throughput in 1u64..=crate::defaults::MAX_INTERVAL_SECS,
        ) {
            let config = ProbeConfig::with_intervals(latency, throughput);
            prop_assert!(config.validate().is_ok());
        }
    }
}
