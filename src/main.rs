//! Network Health Probe - daemon entry point
//!
//! Periodically pings a target and runs speedtests until SIGINT or SIGTERM.

use clap::Parser;
use network_health_probe::{
    cli::Cli,
    config::{display_config_summary, load_config, EnvManager},
    error::{AppError, Result},
    logging::Logger,
    probe::{SpeedtestNetProber, SpeedtestSettings, SystemPingProber},
    scheduler::Scheduler,
    shutdown::spawn_signal_listener,
    PKG_NAME, VERSION,
};
use std::{error::Error, process};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // Set up better panic handling
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(1);
    }));

    // .env has to be in the environment before clap reads it
    if let Err(e) = EnvManager::load_env_file() {
        report_error(&e);
        process::exit(e.exit_code());
    }

    let cli = Cli::parse();

    if let Err(e) = run_application(cli).await {
        report_error(&e);
        process::exit(e.exit_code());
    }
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<()> {
    let config = load_config(cli)?;
    let logger = Logger::with_config("probe", &config);

    if config.debug {
        logger.debug(&format!("{} v{}", PKG_NAME, VERSION)).log();
        for line in display_config_summary(&config).lines() {
            logger.debug(line).log();
        }
    }

    let latency = Box::new(SystemPingProber::new());
    let throughput = Box::new(SpeedtestNetProber::new(SpeedtestSettings::from_config(&config)));

    let shutdown = CancellationToken::new();
    let listener = spawn_signal_listener(shutdown.clone());

    let result = Scheduler::new(config, logger.clone(), latency, throughput)
        .run(shutdown.clone())
        .await;

    // release the signal listener on fatal errors too
    shutdown.cancel();
    if let Err(e) = listener.await {
        logger.warn(&format!("Signal listener ended abnormally: {}", e)).log();
    }

    let report = result?;
    logger
        .debug(&format!(
            "Ran {} ping and {} speedtest probes",
            report.latency_runs, report.throughput_runs
        ))
        .log();

    Ok(())
}

fn report_error(error: &AppError) {
    eprintln!("Error: {}", error);

    if let Some(source) = error.source() {
        eprintln!("Caused by: {}", source);
    }

    print_error_suggestions(error);
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file format");
            eprintln!("  - Intervals must be between 1 and 86400 seconds");
            eprintln!("  - The ping target must be a host name or IP address, not a URL");
        }
        AppError::LatencyProbe(_) => {
            eprintln!();
            eprintln!("Ping troubleshooting:");
            eprintln!("  - Check that the ping target resolves ('nslookup <target>')");
            eprintln!("  - Make sure the 'ping' command is installed and on PATH");
            eprintln!("  - Use --ping-failure skip to keep running when ping fails");
        }
        AppError::SpeedtestFailures(_) => {
            eprintln!();
            eprintln!("Speedtest troubleshooting:");
            eprintln!("  - Check your internet connection");
            eprintln!("  - Try a specific server with --speedtest-server");
            eprintln!("  - Increase --speedtest-timeout on slow links");
        }
        _ => {}
    }
}
