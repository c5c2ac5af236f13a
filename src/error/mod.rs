//! Error handling for the network health probe

use crate::models::ThroughputStep;
use thiserror::Error;

/// Custom error types for the probe daemon
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parsing errors (URLs, ping output, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// I/O errors (process spawning, output streams, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// The latency prober could not be built or run
    #[error("Latency probe error: {0}")]
    LatencyProbe(String),

    /// One step of a throughput probe failed
    #[error("Speedtest error {step}: {message}")]
    Speedtest {
        step: ThroughputStep,
        message: String,
    },

    /// Too many consecutive throughput probe cycles failed
    #[error("Speedtest failed {0} consecutive times")]
    SpeedtestFailures(u32),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new latency probe error
    pub fn latency_probe<S: Into<String>>(message: S) -> Self {
        Self::LatencyProbe(message.into())
    }

    /// Create a new speedtest step error
    pub fn speedtest<S: Into<String>>(step: ThroughputStep, message: S) -> Self {
        Self::Speedtest {
            step,
            message: message.into(),
        }
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Parse(_) => "PARSE",
            Self::Io(_) => "IO",
            Self::LatencyProbe(_) => "PING",
            Self::Speedtest { .. } | Self::SpeedtestFailures(_) => "SPEEDTEST",
        }
    }

    /// Check if error is recoverable (the next tick may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::LatencyProbe(_) | Self::Speedtest { .. } => true,
            Self::Config(_) | Self::Parse(_) => false,
            Self::Io(_) | Self::SpeedtestFailures(_) => false,
        }
    }

    /// Underlying cause without the category prefix, as used in probe log lines
    pub fn cause(&self) -> String {
        match self {
            Self::Config(msg) | Self::Parse(msg) | Self::Io(msg) | Self::LatencyProbe(msg) => msg.clone(),
            Self::Speedtest { message, .. } => message.clone(),
            Self::SpeedtestFailures(_) => self.to_string(),
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) => 1,  // Invalid configuration/usage
            Self::Io(_) => 5,
            Self::LatencyProbe(_) => 7,
            Self::Speedtest { .. } | Self::SpeedtestFailures(_) => 8,
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;
