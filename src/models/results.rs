//! Probe measurement results

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary reported by a pinger after a run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PingStatistics {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub min_rtt: Duration,
    pub avg_rtt: Duration,
    pub max_rtt: Duration,
}

impl PingStatistics {
    /// Percentage of echoes without a reply
    pub fn packet_loss(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        let lost = self.packets_sent.saturating_sub(self.packets_received);
        lost as f64 / self.packets_sent as f64 * 100.0
    }
}

/// Outcome of one successful latency probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyResult {
    pub packets_sent: u32,
    pub average_round_trip_millis: u64,
}

impl From<&PingStatistics> for LatencyResult {
    fn from(stats: &PingStatistics) -> Self {
        Self {
            packets_sent: stats.packets_sent,
            average_round_trip_millis: stats.avg_rtt.as_millis() as u64,
        }
    }
}

impl LatencyResult {
    pub fn log_line(&self) -> String {
        format!(
            "[PING] sent {} ping in an avg of {} ms",
            self.packets_sent, self.average_round_trip_millis
        )
    }
}

/// Measurements of one fully successful throughput probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub latency_millis: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

/// Fallible steps of a throughput probe, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThroughputStep {
    CreateClient,
    SelectServer,
    Download,
    Upload,
}

impl ThroughputStep {
    /// What the probe was doing when the step failed
    pub fn action(&self) -> &'static str {
        match self {
            ThroughputStep::CreateClient => "creating client",
            ThroughputStep::SelectServer => "getting server",
            ThroughputStep::Download => "getting download",
            ThroughputStep::Upload => "getting upload",
        }
    }
}

impl std::fmt::Display for ThroughputStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}

/// How a throughput probe cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThroughputOutcome {
    /// Every step succeeded
    Complete(ThroughputResult),
    /// A server was selected but one of the two measurements failed
    Partial {
        latency_millis: f64,
        download_mbps: Option<f64>,
        upload_mbps: Option<f64>,
    },
    /// Nothing usable was measured; `step` is the last step that failed
    Failed { step: ThroughputStep },
}

impl ThroughputOutcome {
    /// Build the outcome from a selected server's latency and both measurements
    pub fn from_measurements(
        latency_millis: f64,
        download_mbps: Option<f64>,
        upload_mbps: Option<f64>,
    ) -> Self {
        match (download_mbps, upload_mbps) {
            (Some(download_mbps), Some(upload_mbps)) => Self::Complete(ThroughputResult {
                latency_millis,
                download_mbps,
                upload_mbps,
            }),
            (None, None) => Self::Failed {
                step: ThroughputStep::Upload,
            },
            (download_mbps, upload_mbps) => Self::Partial {
                latency_millis,
                download_mbps,
                upload_mbps,
            },
        }
    }

    /// Summary line, or `None` when nothing was measured
    pub fn log_line(&self) -> Option<String> {
        match self {
            Self::Complete(result) => Some(format!(
                "[SPEEDTEST] Ping: {:3.2} ms | Download: {:3.2} Mbps | Upload: {:3.2} Mbps",
                result.latency_millis, result.download_mbps, result.upload_mbps
            )),
            Self::Partial {
                latency_millis,
                download_mbps,
                upload_mbps,
            } => Some(format!(
                "[SPEEDTEST] Ping: {:3.2} ms | Download: {} | Upload: {}",
                latency_millis,
                format_mbps(*download_mbps),
                format_mbps(*upload_mbps)
            )),
            Self::Failed { .. } => None,
        }
    }
}

fn format_mbps(value: Option<f64>) -> String {
    match value {
        Some(mbps) => format!("{:3.2} Mbps", mbps),
        None => "n/a".to_string(),
    }
}
