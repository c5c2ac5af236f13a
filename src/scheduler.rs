//! Probe scheduler
//!
//! Runs one latency probe and one throughput probe at startup, then services
//! two independent interval timers until the shutdown token is cancelled.
//! Probes are awaited one at a time, so at most one probe is in flight and
//! log lines come out in service order.

use crate::{
    error::{AppError, Result},
    log_debug, log_error, log_fatal, log_info,
    logging::Logger,
    models::{FailurePolicy, LatencyResult, ProbeConfig, ThroughputOutcome, ThroughputStep},
    probe::{LatencyProber, ThroughputProber},
};
use serde::{Deserialize, Serialize};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Notice logged once the loop observes the shutdown token
pub const SHUTDOWN_NOTICE: &str = "Received stop signal, stopping...";

/// Invocation counts, returned when the loop exits cleanly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerReport {
    pub latency_runs: u64,
    pub throughput_runs: u64,
}

/// Drives both probes on their intervals
pub struct Scheduler {
    config: ProbeConfig,
    logger: Logger,
    latency: Box<dyn LatencyProber>,
    throughput: Box<dyn ThroughputProber>,
    consecutive_speedtest_failures: u32,
    report: SchedulerReport,
}

impl Scheduler {
    pub fn new(
        config: ProbeConfig,
        logger: Logger,
        latency: Box<dyn LatencyProber>,
        throughput: Box<dyn ThroughputProber>,
    ) -> Self {
        Self {
            config,
            logger,
            latency,
            throughput,
            consecutive_speedtest_failures: 0,
            report: SchedulerReport::default(),
        }
    }

    /// Invocations so far
    pub fn report(&self) -> SchedulerReport {
        self.report
    }

    /// Run until `shutdown` is cancelled or a probe error is fatal
    ///
    /// The baseline latency and throughput probes always both run. The token
    /// is only looked at between ticks.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<SchedulerReport> {
        self.config.validate()?;
        let latency_period = self.config.latency_interval();
        let throughput_period = self.config.throughput_interval();

        log_info!(
            self.logger,
            "Starting probes: ping {} every {}s, speedtest every {}s",
            self.config.ping_target,
            self.config.latency_interval_seconds,
            self.config.throughput_interval_seconds
        )
        .field("latency_interval_seconds", self.config.latency_interval_seconds)
        .field("throughput_interval_seconds", self.config.throughput_interval_seconds)
        .field("latency_failure_policy", self.config.latency_failure_policy.to_string())
        .log();

        // baseline
        self.run_latency_probe().await?;
        self.run_throughput_probe().await?;

        let start = Instant::now();
        let mut latency_timer = interval_at(start + latency_period, latency_period);
        latency_timer.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut throughput_timer = interval_at(start + throughput_period, throughput_period);
        throughput_timer.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = latency_timer.tick() => {
                    self.run_latency_probe().await?;
                }
                _ = throughput_timer.tick() => {
                    self.run_throughput_probe().await?;
                }
            }
        }

        log_info!(self.logger, "{}", SHUTDOWN_NOTICE)
            .field("latency_runs", self.report.latency_runs)
            .field("throughput_runs", self.report.throughput_runs)
            .log();

        Ok(self.report)
    }

    /// One latency probe with the configured failure policy applied
    ///
    /// Returns `Ok(None)` when the probe failed under [`FailurePolicy::Skip`].
    pub async fn run_latency_probe(&mut self) -> Result<Option<LatencyResult>> {
        self.report.latency_runs += 1;

        match self.ping().await {
            Ok(result) => Ok(Some(result)),
            Err(error) => {
                let line = format!("[PING] error running ping: {}", error.cause());
                match self.config.latency_failure_policy {
                    FailurePolicy::Skip => {
                        log_error!(self.logger, "{}", line).error_info(&error).log();
                        Ok(None)
                    }
                    FailurePolicy::Fatal => {
                        log_fatal!(self.logger, "{}", line).error_info(&error).log();
                        Err(error)
                    }
                }
            }
        }
    }

    async fn ping(&self) -> Result<LatencyResult> {
        let target = self.config.ping_target.as_str();
        let mut pinger = self
            .latency
            .create(target)
            .await
            .map_err(into_latency_error)?;
        pinger
            .run(self.config.ping_count)
            .await
            .map_err(into_latency_error)?;

        let statistics = pinger.statistics();
        let result = LatencyResult::from(&statistics);

        log_info!(self.logger, "{}", result.log_line())
            .field("target", target)
            .field("packets_sent", statistics.packets_sent)
            .field("packets_received", statistics.packets_received)
            .field("avg_rtt_ms", result.average_round_trip_millis)
            .field("packet_loss", statistics.packet_loss())
            .log();

        Ok(result)
    }

    /// One throughput probe cycle
    ///
    /// Step failures are logged and folded into the outcome. The only error
    /// returned is [`AppError::SpeedtestFailures`] once the configured limit
    /// of consecutive failed cycles is reached.
    pub async fn run_throughput_probe(&mut self) -> Result<ThroughputOutcome> {
        self.report.throughput_runs += 1;
        let cycle_id = self.logger.start_operation("speedtest");

        let outcome = self.speedtest(&cycle_id).await;

        if let Some(line) = outcome.log_line() {
            let mut entry = log_info!(self.logger, "{}", line)
                .correlation_id(&cycle_id)
                .field("cycle_id", &cycle_id);
            match outcome {
                ThroughputOutcome::Complete(result) => {
                    entry = entry
                        .field("latency_ms", result.latency_millis)
                        .field("download_mbps", result.download_mbps)
                        .field("upload_mbps", result.upload_mbps);
                }
                ThroughputOutcome::Partial {
                    latency_millis,
                    download_mbps,
                    upload_mbps,
                } => {
                    entry = entry
                        .field("latency_ms", latency_millis)
                        .field("download_mbps", download_mbps)
                        .field("upload_mbps", upload_mbps);
                }
                ThroughputOutcome::Failed { .. } => {}
            }
            entry.log();
        }

        if let ThroughputOutcome::Failed { step } = outcome {
            log_error!(self.logger, "[SPEEDTEST] cycle failed after error {}", step.action())
                .correlation_id(&cycle_id)
                .field("cycle_id", &cycle_id)
                .field("step", step)
                .log();

            self.consecutive_speedtest_failures += 1;
            if let Some(limit) = self.config.speedtest_failure_limit {
                if self.consecutive_speedtest_failures >= limit {
                    let error = AppError::SpeedtestFailures(self.consecutive_speedtest_failures);
                    log_fatal!(self.logger, "[SPEEDTEST] {}", error)
                        .correlation_id(&cycle_id)
                        .error_info(&error)
                        .log();
                    return Err(error);
                }
            }
        } else {
            self.consecutive_speedtest_failures = 0;
        }

        Ok(outcome)
    }

    async fn speedtest(&self, cycle_id: &str) -> ThroughputOutcome {
        let client = match self.throughput.create_client().await {
            Ok(client) => client,
            Err(error) => {
                self.log_step_error(ThroughputStep::CreateClient, &error, cycle_id);
                return ThroughputOutcome::Failed {
                    step: ThroughputStep::CreateClient,
                };
            }
        };

        let server = match client.select_server(&self.config.speedtest_server).await {
            Ok(server) => server,
            Err(error) => {
                self.log_step_error(ThroughputStep::SelectServer, &error, cycle_id);
                return ThroughputOutcome::Failed {
                    step: ThroughputStep::SelectServer,
                };
            }
        };

        log_debug!(self.logger, "[SPEEDTEST] using server {}", server.label())
            .correlation_id(cycle_id)
            .field("server_id", &server.id)
            .field("server_latency_ms", server.latency_millis)
            .log();

        let download = match client.measure_download(&server).await {
            Ok(mbps) => Some(mbps),
            Err(error) => {
                self.log_step_error(ThroughputStep::Download, &error, cycle_id);
                None
            }
        };

        // upload does not depend on the download result
        let upload = match client.measure_upload(&server).await {
            Ok(mbps) => Some(mbps),
            Err(error) => {
                self.log_step_error(ThroughputStep::Upload, &error, cycle_id);
                None
            }
        };

        ThroughputOutcome::from_measurements(server.latency_millis, download, upload)
    }

    fn log_step_error(&self, step: ThroughputStep, error: &AppError, cycle_id: &str) {
        log_error!(self.logger, "[SPEEDTEST] error {}: {}", step.action(), error.cause())
            .correlation_id(cycle_id)
            .field("cycle_id", cycle_id)
            .field("step", step)
            .error_info(error)
            .log();
    }
}

fn into_latency_error(error: AppError) -> AppError {
    match error {
        AppError::LatencyProbe(_) => error,
        other => AppError::latency_probe(other.cause()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::models::PingStatistics;
    use crate::probe::{Pinger, SpeedtestServer, ThroughputClient};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedPinger;

    #[async_trait]
    impl Pinger for FixedPinger {
        async fn run(&mut self, _count: u32) -> Result<()> {
            Ok(())
        }

        fn statistics(&self) -> PingStatistics {
            PingStatistics {
                packets_sent: 3,
                packets_received: 3,
                min_rtt: Duration::from_millis(10),
                avg_rtt: Duration::from_millis(12),
                max_rtt: Duration::from_millis(15),
            }
        }
    }

    struct FixedLatency {
        fail: bool,
    }

    #[async_trait]
    impl LatencyProber for FixedLatency {
        async fn create(&self, target: &str) -> Result<Box<dyn crate::probe::Pinger>> {
            if self.fail {
                Err(AppError::io(format!("cannot resolve {}", target)))
            } else {
                Ok(Box::new(FixedPinger))
            }
        }
    }

    #[derive(Clone, Copy)]
    struct FixedThroughput {
        client_fails: bool,
        server_fails: bool,
        download_fails: bool,
        upload_fails: bool,
    }

    impl FixedThroughput {
        fn healthy() -> Self {
            Self {
                client_fails: false,
                server_fails: false,
                download_fails: false,
                upload_fails: false,
            }
        }
    }

    #[async_trait]
    impl ThroughputProber for FixedThroughput {
        async fn create_client(&self) -> Result<Box<dyn ThroughputClient>> {
            if self.client_fails {
                Err(AppError::speedtest(ThroughputStep::CreateClient, "no route to host"))
            } else {
                Ok(Box::new(*self))
            }
        }
    }

    #[async_trait]
    impl ThroughputClient for FixedThroughput {
        async fn select_server(&self, hint: &str) -> Result<SpeedtestServer> {
            if self.server_fails {
                return Err(AppError::speedtest(ThroughputStep::SelectServer, "no candidate server answered"));
            }
            Ok(SpeedtestServer {
                id: if hint.is_empty() { "1".to_string() } else { hint.to_string() },
                name: "Test".to_string(),
                sponsor: String::new(),
                country: String::new(),
                url: "http://speed.test/speedtest/upload.php".to_string(),
                host: "speed.test".to_string(),
                latency_millis: 8.5,
            })
        }

        async fn measure_download(&self, _server: &SpeedtestServer) -> Result<f64> {
            if self.download_fails {
                Err(AppError::speedtest(ThroughputStep::Download, "connection reset"))
            } else {
                Ok(94.25)
            }
        }

        async fn measure_upload(&self, _server: &SpeedtestServer) -> Result<f64> {
            if self.upload_fails {
                Err(AppError::speedtest(ThroughputStep::Upload, "connection reset"))
            } else {
                Ok(18.5)
            }
        }
    }

    fn scheduler(config: ProbeConfig, latency_fails: bool, throughput: FixedThroughput) -> (Scheduler, MemorySink) {
        let sink = MemorySink::new();
        let logger = Logger::new("probe").with_sink(Arc::new(sink.clone()));
        let scheduler = Scheduler::new(
            config,
            logger,
            Box::new(FixedLatency { fail: latency_fails }),
            Box::new(throughput),
        );
        (scheduler, sink)
    }

    #[tokio::test]
    async fn test_latency_probe_logs_result() {
        let (mut scheduler, sink) = scheduler(ProbeConfig::default(), false, FixedThroughput::healthy());
        let result = scheduler.run_latency_probe().await.unwrap().unwrap();

        assert_eq!(result.packets_sent, 3);
        assert_eq!(result.average_round_trip_millis, 12);
        assert!(sink.contains("[PING] sent 3 ping in an avg of 12 ms"));
        assert_eq!(scheduler.report().latency_runs, 1);
    }

    #[tokio::test]
    async fn test_latency_failure_is_fatal_by_default() {
        let (mut scheduler, sink) = scheduler(ProbeConfig::default(), true, FixedThroughput::healthy());
        let error = scheduler.run_latency_probe().await.unwrap_err();

        assert!(matches!(error, AppError::LatencyProbe(_)));
        assert!(error.cause().contains("cannot resolve www.google.com"));
        assert!(sink.contains("FATAL [probe] [PING] error running ping: cannot resolve"));
    }

    #[tokio::test]
    async fn test_latency_failure_skipped_by_policy() {
        let config = ProbeConfig {
            latency_failure_policy: FailurePolicy::Skip,
            ..Default::default()
        };
        let (mut scheduler, sink) = scheduler(config, true, FixedThroughput::healthy());

        assert!(scheduler.run_latency_probe().await.unwrap().is_none());
        assert!(sink.contains("[PING] error running ping: cannot resolve www.google.com"));
    }

    #[tokio::test]
    async fn test_complete_throughput_cycle() {
        let (mut scheduler, sink) = scheduler(ProbeConfig::default(), false, FixedThroughput::healthy());
        let outcome = scheduler.run_throughput_probe().await.unwrap();

        assert!(matches!(outcome, ThroughputOutcome::Complete(_)));
        assert!(sink.contains("[SPEEDTEST] Ping: 8.50 ms | Download: 94.25 Mbps | Upload: 18.50 Mbps"));
    }

    #[tokio::test]
    async fn test_client_failure_short_circuits() {
        let throughput = FixedThroughput {
            client_fails: true,
            ..FixedThroughput::healthy()
        };
        let (mut scheduler, sink) = scheduler(ProbeConfig::default(), false, throughput);
        let outcome = scheduler.run_throughput_probe().await.unwrap();

        assert_eq!(outcome, ThroughputOutcome::Failed { step: ThroughputStep::CreateClient });
        assert!(sink.contains("[SPEEDTEST] error creating client: no route to host"));
        assert!(!sink.contains("getting server"));
        assert!(!sink.contains("[SPEEDTEST] Ping:"));
    }

    #[tokio::test]
    async fn test_server_failure_skips_measurements() {
        let throughput = FixedThroughput {
            server_fails: true,
            ..FixedThroughput::healthy()
        };
        let (mut scheduler, sink) = scheduler(ProbeConfig::default(), false, throughput);
        let outcome = scheduler.run_throughput_probe().await.unwrap();

        assert_eq!(outcome, ThroughputOutcome::Failed { step: ThroughputStep::SelectServer });
        assert!(sink.contains("[SPEEDTEST] error getting server: no candidate server answered"));
        assert!(!sink.contains("getting download"));
        assert!(!sink.contains("getting upload"));
    }

    #[tokio::test]
    async fn test_download_failure_still_measures_upload() {
        let throughput = FixedThroughput {
            download_fails: true,
            ..FixedThroughput::healthy()
        };
        let (mut scheduler, sink) = scheduler(ProbeConfig::default(), false, throughput);
        let outcome = scheduler.run_throughput_probe().await.unwrap();

        assert_eq!(
            outcome,
            ThroughputOutcome::Partial {
                latency_millis: 8.5,
                download_mbps: None,
                upload_mbps: Some(18.5),
            }
        );
        assert!(sink.contains("[SPEEDTEST] error getting download: connection reset"));
        assert!(sink.contains("Download: n/a | Upload: 18.50 Mbps"));
        assert!(!sink.contains("cycle failed"));
    }

    #[tokio::test]
    async fn test_both_measurements_failing() {
        let throughput = FixedThroughput {
            download_fails: true,
            upload_fails: true,
            ..FixedThroughput::healthy()
        };
        let (mut scheduler, sink) = scheduler(ProbeConfig::default(), false, throughput);
        let outcome = scheduler.run_throughput_probe().await.unwrap();

        assert_eq!(outcome, ThroughputOutcome::Failed { step: ThroughputStep::Upload });
        assert!(sink.contains("error getting download"));
        assert!(sink.contains("error getting upload"));
        assert!(!sink.contains("[SPEEDTEST] Ping:"));
    }

    #[tokio::test]
    async fn test_failed_cycle_logs_one_summary_line_with_cycle_id() {
        let throughput = FixedThroughput {
            server_fails: true,
            ..FixedThroughput::healthy()
        };
        let (mut scheduler, sink) = scheduler(ProbeConfig::default(), false, throughput);
        scheduler.logger.set_format(crate::logging::LogFormat::Json);
        scheduler.run_throughput_probe().await.unwrap();

        let summaries = sink.matching("[SPEEDTEST] cycle failed after error getting server");
        assert_eq!(summaries.len(), 1);

        let summary: serde_json::Value = serde_json::from_str(&summaries[0]).unwrap();
        let step_line: serde_json::Value =
            serde_json::from_str(&sink.matching("[SPEEDTEST] error getting server")[0]).unwrap();
        assert_eq!(summary["level"], "Error");
        assert_eq!(summary["fields"]["step"], step_line["fields"]["step"]);
        assert_eq!(summary["fields"]["cycle_id"], step_line["fields"]["cycle_id"]);
        assert_eq!(summary["correlation_id"], step_line["correlation_id"]);
    }

    #[tokio::test]
    async fn test_failures_escalate_only_when_limit_set() {
        let throughput = FixedThroughput {
            client_fails: true,
            ..FixedThroughput::healthy()
        };

        let (mut unlimited, _) = scheduler(ProbeConfig::default(), false, throughput);
        for _ in 0..5 {
            assert!(unlimited.run_throughput_probe().await.is_ok());
        }

        let config = ProbeConfig {
            speedtest_failure_limit: Some(2),
            ..Default::default()
        };
        let (mut limited, sink) = scheduler(config, false, throughput);
        assert!(limited.run_throughput_probe().await.is_ok());
        let error = limited.run_throughput_probe().await.unwrap_err();
        assert!(matches!(error, AppError::SpeedtestFailures(2)));
        assert!(sink.contains("Speedtest failed 2 consecutive times"));
    }

    #[tokio::test]
    async fn test_partial_cycle_resets_failure_count() {
        let config = ProbeConfig {
            speedtest_failure_limit: Some(2),
            ..Default::default()
        };
        let failing = FixedThroughput {
            server_fails: true,
            ..FixedThroughput::healthy()
        };
        let (mut scheduler, _) = scheduler(config, false, failing);
        assert!(scheduler.run_throughput_probe().await.is_ok());

        scheduler.throughput = Box::new(FixedThroughput {
            upload_fails: true,
            ..FixedThroughput::healthy()
        });
        assert!(scheduler.run_throughput_probe().await.is_ok());

        scheduler.throughput = Box::new(failing);
        assert!(scheduler.run_throughput_probe().await.is_ok());
    }

    #[tokio::test]
    async fn test_server_hint_is_passed_through() {
        let config = ProbeConfig {
            speedtest_server: "4242".to_string(),
            debug: true,
            ..Default::default()
        };
        let (mut scheduler, sink) = scheduler(config, false, FixedThroughput::healthy());
        scheduler.logger.set_level(crate::logging::LogLevel::Debug);
        scheduler.run_throughput_probe().await.unwrap();

        assert!(sink.contains("[SPEEDTEST] using server Test (4242)"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_still_runs_full_baseline() {
        let (scheduler, sink) = scheduler(ProbeConfig::default(), false, FixedThroughput::healthy());
        let token = CancellationToken::new();
        token.cancel();

        let report = scheduler.run(token).await.unwrap();
        assert_eq!(report, SchedulerReport { latency_runs: 1, throughput_runs: 1 });
        assert!(sink.contains("[SPEEDTEST] Ping: 8.50 ms"));
        assert!(sink.contains(SHUTDOWN_NOTICE));
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected_before_any_run() {
        for (latency, throughput) in [(0, 5), (5, 0)] {
            let (scheduler, sink) =
                scheduler(ProbeConfig::with_intervals(latency, throughput), false, FixedThroughput::healthy());

            let error = scheduler.run(CancellationToken::new()).await.unwrap_err();
            assert!(matches!(error, AppError::Config(_)), "{:?}", error);
            assert!(sink.lines().is_empty());
        }
    }

    #[tokio::test]
    async fn test_debug_lines_carry_source_location() {
        let config = ProbeConfig {
            debug: true,
            enable_color: false,
            ..Default::default()
        };
        let sink = MemorySink::new();
        let logger = Logger::with_config("probe", &config).with_sink(Arc::new(sink.clone()));
        let mut scheduler = Scheduler::new(
            config,
            logger,
            Box::new(FixedLatency { fail: false }),
            Box::new(FixedThroughput::healthy()),
        );

        scheduler.run_latency_probe().await.unwrap();
        scheduler.run_throughput_probe().await.unwrap();

        let ping = sink.matching("[PING] sent 3 ping").pop().unwrap();
        assert!(ping.contains(" @ src/scheduler.rs:"), "{}", ping);
        let speedtest = sink.matching("[SPEEDTEST] Ping:").pop().unwrap();
        assert!(speedtest.contains(" @ src/scheduler.rs:"), "{}", speedtest);
    }
}
