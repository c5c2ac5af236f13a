//! Command-line interface
//!
//! Every option can also come from the environment (or a `.env` file loaded
//! before parsing). Flags win over the environment.

use crate::logging::LogFormat;
use crate::models::FailurePolicy;
use clap::Parser;
use std::ffi::OsStr;

/// Network health probe - periodic ping and speedtest measurements
#[derive(Parser, Debug, Clone)]
#[command(name = "nhp")]
#[command(version, long_version = crate::LONG_VERSION, about, long_about = None)]
pub struct Cli {
    /// Seconds between ping probes
    #[arg(long = "ping", env = "PING_INTERVAL", value_name = "SECONDS", value_parser = parse_interval, default_value_t = crate::defaults::DEFAULT_PING_INTERVAL_SECS)]
    pub ping_interval: u64,

    /// Seconds between speedtest probes
    #[arg(long = "speedtest", env = "SPEEDTEST_INTERVAL", value_name = "SECONDS", value_parser = parse_interval, default_value_t = crate::defaults::DEFAULT_SPEEDTEST_INTERVAL_SECS)]
    pub speedtest_interval: u64,

    /// Host to ping
    #[arg(long, env = "PING_TARGET", value_name = "HOST", default_value = crate::defaults::DEFAULT_PING_TARGET)]
    pub ping_target: String,

    /// Echo requests per ping probe
    #[arg(long, env = "PING_COUNT", value_parser = clap::value_parser!(u32).range(1..=crate::defaults::MAX_PING_COUNT as i64), default_value_t = crate::defaults::DEFAULT_PING_COUNT)]
    pub ping_count: u32,

    /// Speedtest server id (empty selects the fastest server)
    #[arg(long, env = "SPEEDTEST_SERVER", value_name = "ID", default_value = "")]
    pub speedtest_server: String,

    /// HTTP timeout of the speedtest client in seconds
    #[arg(long, env = "SPEEDTEST_TIMEOUT", value_name = "SECONDS", value_parser = parse_timeout, default_value_t = crate::defaults::DEFAULT_SPEEDTEST_TIMEOUT.as_secs())]
    pub speedtest_timeout: u64,

    /// What to do when a ping probe fails
    #[arg(long = "ping-failure", env = "PING_FAILURE_POLICY", value_enum, default_value_t = FailurePolicy::Fatal)]
    pub ping_failure: FailurePolicy,

    /// Stop after this many consecutive failed speedtests
    #[arg(long, env = "SPEEDTEST_FAILURE_LIMIT", value_name = "COUNT", value_parser = clap::value_parser!(u32).range(1..))]
    pub speedtest_failure_limit: Option<u32>,

    /// Log line format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Console)]
    pub log_format: LogFormat,

    /// Disable colored output (a non-empty NO_COLOR does the same)
    #[arg(long)]
    pub no_color: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.no_color || no_color_requested(std::env::var_os("NO_COLOR").as_deref()) {
            return false;
        }
        supports_color()
    }
}

/// Parse a probe interval in seconds
fn parse_interval(s: &str) -> Result<u64, String> {
    let max = crate::defaults::MAX_INTERVAL_SECS;
    parse_seconds(s).and_then(|secs| {
        if secs == 0 {
            Err("Interval must be greater than 0".to_string())
        } else if secs > max {
            Err(format!("Interval cannot exceed {} seconds", max))
        } else {
            Ok(secs)
        }
    })
}

/// Parse the speedtest timeout in seconds
fn parse_timeout(s: &str) -> Result<u64, String> {
    parse_seconds(s).and_then(|secs| {
        if secs == 0 {
            Err("Timeout must be greater than 0".to_string())
        } else if secs > 300 {
            Err("Timeout cannot exceed 300 seconds".to_string())
        } else {
            Ok(secs)
        }
    })
}

fn parse_seconds(s: &str) -> Result<u64, String> {
    // Reject strings with leading + sign or other invalid formats
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid number of seconds: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid number of seconds: {}", s))
}

/// `NO_COLOR` turns color off whenever it is present and not empty
fn no_color_requested(value: Option<&OsStr>) -> bool {
    value.is_some_and(|value| !value.is_empty())
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}
