//! Network Health Probe
//!
//! A long-running daemon that periodically measures latency (ICMP echo via the
//! system `ping`) and throughput (an HTTP speedtest against a selected server)
//! and logs the results as structured lines.
//!
//! The [`scheduler::Scheduler`] only depends on the collaborator traits in
//! [`probe`]; the shipped implementations live in [`probe::ping`] and
//! [`probe::speedtest`].

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod probe;
pub mod scheduler;
pub mod shutdown;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{FailurePolicy, LatencyResult, ProbeConfig, ThroughputOutcome, ThroughputResult};
pub use scheduler::{Scheduler, SchedulerReport};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Version line with build information, shown by `--version`
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_TIME"),
    " for ",
    env!("TARGET_TRIPLE"),
    ")"
);

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_PING_INTERVAL_SECS: u64 = 5;
    pub const DEFAULT_SPEEDTEST_INTERVAL_SECS: u64 = 120;
    pub const DEFAULT_PING_TARGET: &str = "www.google.com";
    pub const DEFAULT_PING_COUNT: u32 = 3;
    pub const DEFAULT_SPEEDTEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    /// One day
    pub const MAX_INTERVAL_SECS: u64 = 86_400;
    pub const MAX_PING_COUNT: u32 = 100;
}
