//! Probe collaborators used by the scheduler
//!
//! The scheduler only talks to the traits in this module:
//! - [`LatencyProber`] builds a [`Pinger`] for a target; the pinger runs a
//!   fixed number of echoes and reports [`PingStatistics`]
//! - [`ThroughputProber`] builds a [`ThroughputClient`] that selects a
//!   [`SpeedtestServer`] and measures download and upload rates against it
//!
//! [`ping::SystemPingProber`] and [`speedtest::SpeedtestNetProber`] are the
//! implementations the daemon ships with.

pub mod ping;
pub mod speedtest;

pub use ping::{parse_ping_output, SystemPingProber};
pub use speedtest::{SpeedtestNetProber, SpeedtestSettings};

use crate::{error::Result, models::PingStatistics};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Builds pingers for a target host
#[async_trait]
pub trait LatencyProber: Send + Sync {
    /// Prepare a pinger for `target`; fails when the pinger cannot be built
    async fn create(&self, target: &str) -> Result<Box<dyn Pinger>>;
}

/// A prepared echo session against one target
#[async_trait]
pub trait Pinger: Send {
    /// Send `count` echoes and wait for the run to finish
    async fn run(&mut self, count: u32) -> Result<()>;

    /// Statistics of the last run
    fn statistics(&self) -> PingStatistics;
}

/// Builds speedtest clients
#[async_trait]
pub trait ThroughputProber: Send + Sync {
    async fn create_client(&self) -> Result<Box<dyn ThroughputClient>>;
}

/// A speedtest session able to pick a server and measure against it
#[async_trait]
pub trait ThroughputClient: Send + Sync {
    /// Select a server; an empty hint asks for the fastest one
    async fn select_server(&self, hint: &str) -> Result<SpeedtestServer>;

    /// Download rate in Mbps
    async fn measure_download(&self, server: &SpeedtestServer) -> Result<f64>;

    /// Upload rate in Mbps
    async fn measure_upload(&self, server: &SpeedtestServer) -> Result<f64>;
}

/// A measurement server and its measured latency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedtestServer {
    pub id: String,
    pub name: String,
    pub sponsor: String,
    pub country: String,
    /// Upload endpoint; sibling resources are resolved against it
    pub url: String,
    pub host: String,
    pub latency_millis: f64,
}

impl SpeedtestServer {
    /// Human readable label for log lines
    pub fn label(&self) -> String {
        if self.sponsor.is_empty() {
            format!("{} ({})", self.name, self.id)
        } else {
            format!("{} - {} ({})", self.sponsor, self.name, self.id)
        }
    }
}
