//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::Path;

/// Environment variables read by the CLI, with descriptions
pub const SUPPORTED_VARIABLES: &[(&str, &str)] = &[
    ("PING_INTERVAL", "Seconds between ping probes (1-86400)"),
    ("SPEEDTEST_INTERVAL", "Seconds between speedtest probes (1-86400)"),
    ("PING_TARGET", "Host to ping"),
    ("PING_COUNT", "Echo requests per ping probe (1-100)"),
    ("SPEEDTEST_SERVER", "Speedtest server id, empty for the fastest server"),
    ("SPEEDTEST_TIMEOUT", "HTTP timeout of the speedtest client in seconds (1-300)"),
    ("PING_FAILURE_POLICY", "fatal or skip"),
    ("SPEEDTEST_FAILURE_LIMIT", "Consecutive failed speedtests before exiting"),
    ("LOG_FORMAT", "console, json or compact"),
    ("NO_COLOR", "Disable colored output when set to any non-empty value"),
];

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the working directory if it exists
    ///
    /// Must run before the CLI is parsed. Variables already present in the
    /// process environment are not overwritten.
    pub fn load_env_file() -> Result<bool> {
        Self::load_env_file_from(Path::new(".env"))
    }

    /// Load the given env file if it exists; returns whether it was loaded
    pub fn load_env_file_from(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }

        dotenv::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(true)
    }
}
