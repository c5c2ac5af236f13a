//! ICMP echo via the platform `ping` binary
//!
//! The binary is setuid or capability-enabled on every mainstream platform,
//! so the daemon itself needs no raw-socket privileges. Only the summary
//! block of the output is parsed:
//!
//! ```text
//! 3 packets transmitted, 3 received, 0% packet loss, time 2003ms
//! rtt min/avg/max/mdev = 11.950/12.345/12.800/0.350 ms
//! ```
//!
//! or, on Windows:
//!
//! ```text
//!     Packets: Sent = 3, Received = 3, Lost = 0 (0% loss),
//!     Minimum = 11ms, Maximum = 13ms, Average = 12ms
//! ```

use super::{LatencyProber, Pinger};
use crate::{
    error::{AppError, Result},
    models::PingStatistics,
};
use async_trait::async_trait;
use regex::Regex;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

static UNIX_COUNTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").expect("valid regex")
});

static UNIX_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"min/avg/max[^=]*=\s*([\d.]+)/([\d.]+)/([\d.]+)").expect("valid regex")
});

static WINDOWS_COUNTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Sent = (\d+), Received = (\d+)").expect("valid regex")
});

static WINDOWS_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Minimum = (\d+)ms, Maximum = (\d+)ms, Average = (\d+)ms").expect("valid regex")
});

/// Parse the summary printed by `ping`
///
/// A run without replies has counts but no round-trip line; its round-trip
/// times are zero.
pub fn parse_ping_output(output: &str) -> Result<PingStatistics> {
    let (counts, rtt) = if let Some(counts) = UNIX_COUNTS.captures(output) {
        (counts, UNIX_RTT.captures(output))
    } else if let Some(counts) = WINDOWS_COUNTS.captures(output) {
        (counts, WINDOWS_RTT.captures(output))
    } else {
        return Err(AppError::parse("ping output has no packet summary"));
    };

    let packets_sent = counts[1].parse::<u32>()?;
    let packets_received = counts[2].parse::<u32>()?;

    let mut stats = PingStatistics {
        packets_sent,
        packets_received,
        ..Default::default()
    };

    if let Some(rtt) = rtt {
        // Windows prints min/max/avg, everything else min/avg/max
        let (min, avg, max) = if rtt[0].starts_with("Minimum") {
            (&rtt[1], &rtt[3], &rtt[2])
        } else {
            (&rtt[1], &rtt[2], &rtt[3])
        };
        stats.min_rtt = parse_millis(min)?;
        stats.avg_rtt = parse_millis(avg)?;
        stats.max_rtt = parse_millis(max)?;
    }

    Ok(stats)
}

fn parse_millis(value: &str) -> Result<Duration> {
    let millis: f64 = value
        .parse()
        .map_err(|_| AppError::parse(format!("invalid round-trip time '{}'", value)))?;
    if !millis.is_finite() || millis < 0.0 {
        return Err(AppError::parse(format!("invalid round-trip time '{}'", value)));
    }
    Ok(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
}

/// Builds pingers backed by the system `ping` command
#[derive(Debug, Clone)]
pub struct SystemPingProber {
    program: String,
    leading_args: Vec<String>,
}

impl Default for SystemPingProber {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            leading_args: Vec::new(),
        }
    }
}

impl SystemPingProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another program; `leading_args` go before the count and address
    pub fn with_command<S: Into<String>>(program: S, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }
}

#[async_trait]
impl LatencyProber for SystemPingProber {
    async fn create(&self, target: &str) -> Result<Box<dyn Pinger>> {
        let target = target.trim();
        if target.is_empty() {
            return Err(AppError::latency_probe("ping target is empty"));
        }

        let address = resolve(target).await?;

        Ok(Box::new(SystemPinger {
            target: target.to_string(),
            address,
            program: self.program.clone(),
            leading_args: self.leading_args.clone(),
            stats: PingStatistics::default(),
        }))
    }
}

/// Resolve `target`, preferring IPv4 like the classic `ping`
async fn resolve(target: &str) -> Result<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addresses: Vec<IpAddr> = tokio::net::lookup_host((target, 0))
        .await
        .map_err(|e| AppError::latency_probe(format!("cannot resolve {}: {}", target, e)))?
        .map(|addr| addr.ip())
        .collect();

    addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
        .ok_or_else(|| AppError::latency_probe(format!("cannot resolve {}: no addresses", target)))
}

/// One `ping` invocation per run against a resolved address
#[derive(Debug)]
pub struct SystemPinger {
    target: String,
    address: IpAddr,
    program: String,
    leading_args: Vec<String>,
    stats: PingStatistics,
}

impl SystemPinger {
    fn count_args(&self, count: u32) -> Vec<String> {
        let count_flag = if cfg!(windows) { "-n" } else { "-c" };
        vec![count_flag.to_string(), count.to_string(), self.address.to_string()]
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn run(&mut self, count: u32) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(self.count_args(count))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::latency_probe(format!("failed to start {}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_ping_output(&stdout) {
            Ok(stats) => {
                self.stats = stats;
                Ok(())
            }
            Err(e) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = stderr.trim();
                Err(AppError::latency_probe(format!(
                    "pinging {} ({}) failed with {}: {}",
                    self.target,
                    self.address,
                    output.status,
                    if detail.is_empty() { e.cause() } else { detail.to_string() }
                )))
            }
        }
    }

    fn statistics(&self) -> PingStatistics {
        self.stats
    }
}
