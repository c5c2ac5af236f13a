//! Configuration parsing from CLI arguments

use crate::{cli::Cli, error::Result, models::ProbeConfig};

/// Turns parsed CLI arguments into a validated [`ProbeConfig`]
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<ProbeConfig> {
        let cli = &self.cli;
        let config = ProbeConfig {
            latency_interval_seconds: cli.ping_interval,
            throughput_interval_seconds: cli.speedtest_interval,
            ping_target: cli.ping_target.trim().to_string(),
            ping_count: cli.ping_count,
            speedtest_server: cli.speedtest_server.trim().to_string(),
            speedtest_timeout_seconds: cli.speedtest_timeout,
            latency_failure_policy: cli.ping_failure,
            speedtest_failure_limit: cli.speedtest_failure_limit,
            log_format: cli.log_format,
            enable_color: cli.use_colors(),
            debug: cli.debug,
        };

        config.validate()?;

        Ok(config)
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<ProbeConfig> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &ProbeConfig) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Ping target: {}", config.ping_target));
    summary.push(format!("Ping count: {}", config.ping_count));
    summary.push(format!("Ping interval: {}s", config.latency_interval_seconds));
    summary.push(format!("Ping failure policy: {}", config.latency_failure_policy));
    summary.push(format!("Speedtest interval: {}s", config.throughput_interval_seconds));
    summary.push(format!(
        "Speedtest server: {}",
        if config.speedtest_server.is_empty() { "fastest" } else { &config.speedtest_server }
    ));
    summary.push(format!("Speedtest timeout: {}s", config.speedtest_timeout_seconds));
    summary.push(format!(
        "Speedtest failure limit: {}",
        config
            .speedtest_failure_limit
            .map_or_else(|| "none".to_string(), |limit| limit.to_string())
    ));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use crate::models::FailurePolicy;
    use clap::Parser;

    #[test]
    fn test_cli_values_reach_config() {
        let cli = Cli::parse_from([
            "nhp",
            "--ping", "7",
            "--speedtest", "90",
            "--ping-target", " 1.1.1.1 ",
            "--ping-failure", "skip",
            "--speedtest-failure-limit", "2",
            "--log-format", "compact",
            "--no-color",
        ]);
        let config = load_config(cli).unwrap();

        assert_eq!(config.latency_interval_seconds, 7);
        assert_eq!(config.throughput_interval_seconds, 90);
        assert_eq!(config.ping_target, "1.1.1.1");
        assert_eq!(config.latency_failure_policy, FailurePolicy::Skip);
        assert_eq!(config.speedtest_failure_limit, Some(2));
        assert_eq!(config.log_format, LogFormat::Compact);
        assert!(!config.enable_color);
    }

    #[test]
    fn test_invalid_target_rejected() {
        let cli = Cli::parse_from(["nhp", "--ping-target", "http://example.com"]);
        let error = load_config(cli).unwrap_err();
        assert_eq!(error.category(), "CONFIG");
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_display_config_summary() {
        let config = ProbeConfig {
            speedtest_failure_limit: Some(3),
            ..Default::default()
        };
        let summary = display_config_summary(&config);

        assert!(summary.contains("Ping target: www.google.com"));
        assert!(summary.contains("Speedtest server: fastest"));
        assert!(summary.contains("Speedtest failure limit: 3"));
    }
}
