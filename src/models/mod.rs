//! Data models for the probe daemon

pub mod config;
pub mod results;

// Re-export main model types
pub use config::{FailurePolicy, ProbeConfig};
pub use results::{
    LatencyResult, PingStatistics, ThroughputOutcome, ThroughputResult, ThroughputStep,
};
