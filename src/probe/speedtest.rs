//! HTTP speedtest client for speedtest.net style servers
//!
//! A server is described by its upload endpoint (`.../speedtest/upload.php`).
//! The other resources live next to it:
//! - `latency.txt` answers latency samples
//! - `random{N}x{N}.jpg` are the download payloads
//!
//! The server list is fetched once per client; server selection, download
//! and upload each issue their own requests.

use super::{SpeedtestServer, ThroughputClient, ThroughputProber};
use crate::{
    error::{AppError, Result},
    models::{ProbeConfig, ThroughputStep},
};
use async_trait::async_trait;
use futures::{future::join_all, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::{Duration, Instant};
use url::Url;

/// Public server list, nearest servers first
pub const DEFAULT_SERVERS_URL: &str =
    "https://www.speedtest.net/api/js/servers?engine=js&https_functional=true&limit=10";

/// Knobs of the speedtest client
#[derive(Debug, Clone)]
pub struct SpeedtestSettings {
    pub servers_url: String,
    /// Timeout applied to every HTTP request
    pub timeout: Duration,
    /// Servers probed for latency when picking the fastest one
    pub candidate_limit: usize,
    pub latency_samples: u32,
    /// Edge lengths of the `random{N}x{N}.jpg` download payloads
    pub download_sizes: Vec<u32>,
    /// Upload payload sizes in bytes
    pub upload_sizes: Vec<usize>,
    pub user_agent: String,
}

impl Default for SpeedtestSettings {
    fn default() -> Self {
        Self {
            servers_url: DEFAULT_SERVERS_URL.to_string(),
            timeout: crate::defaults::DEFAULT_SPEEDTEST_TIMEOUT,
            candidate_limit: 5,
            latency_samples: 3,
            download_sizes: vec![350, 500, 750, 1000, 1500],
            upload_sizes: vec![250_000, 500_000, 1_000_000],
            user_agent: format!("{}/{}", crate::PKG_NAME, crate::VERSION),
        }
    }
}

impl SpeedtestSettings {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            timeout: config.speedtest_timeout(),
            ..Self::default()
        }
    }

    pub fn with_servers_url<S: Into<String>>(mut self, servers_url: S) -> Self {
        self.servers_url = servers_url.into();
        self
    }
}

/// Entry of the server list
#[derive(Debug, Clone, Deserialize)]
struct ServerEntry {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    sponsor: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    host: String,
}

impl ServerEntry {
    fn resource(&self, name: &str) -> std::result::Result<Url, url::ParseError> {
        Url::parse(&self.url)?.join(name)
    }

    fn into_server(self, latency_millis: f64) -> SpeedtestServer {
        SpeedtestServer {
            id: self.id,
            name: self.name,
            sponsor: self.sponsor,
            country: self.country,
            url: self.url,
            host: self.host,
            latency_millis,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// Bytes over wall time, in megabits per second
pub fn megabits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64().max(1e-6);
    bytes as f64 * 8.0 / seconds / 1_000_000.0
}

fn step_error(step: ThroughputStep) -> impl Fn(reqwest::Error) -> AppError {
    move |e| AppError::speedtest(step, e.to_string())
}

/// Throughput prober backed by speedtest.net servers
#[derive(Debug, Clone, Default)]
pub struct SpeedtestNetProber {
    settings: SpeedtestSettings,
}

impl SpeedtestNetProber {
    pub fn new(settings: SpeedtestSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SpeedtestSettings {
        &self.settings
    }
}

#[async_trait]
impl ThroughputProber for SpeedtestNetProber {
    async fn create_client(&self) -> Result<Box<dyn ThroughputClient>> {
        let step = ThroughputStep::CreateClient;
        let http = Client::builder()
            .timeout(self.settings.timeout)
            .user_agent(self.settings.user_agent.clone())
            .build()
            .map_err(step_error(step))?;

        let servers: Vec<ServerEntry> = http
            .get(&self.settings.servers_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(step_error(step))?
            .json()
            .await
            .map_err(step_error(step))?;

        if servers.is_empty() {
            return Err(AppError::speedtest(step, "server list is empty"));
        }

        Ok(Box::new(SpeedtestNetClient {
            http,
            servers,
            settings: self.settings.clone(),
        }))
    }
}

/// Client holding the fetched server list
#[derive(Debug)]
pub struct SpeedtestNetClient {
    http: Client,
    servers: Vec<ServerEntry>,
    settings: SpeedtestSettings,
}

impl SpeedtestNetClient {
    /// Best of `latency_samples` round trips to `latency.txt`, in milliseconds
    async fn measure_latency(&self, server: &ServerEntry) -> Result<f64> {
        let step = ThroughputStep::SelectServer;
        let url = server
            .resource("latency.txt")
            .map_err(|e| AppError::speedtest(step, format!("invalid server url '{}': {}", server.url, e)))?;

        let mut best: Option<Duration> = None;
        for _ in 0..self.settings.latency_samples.max(1) {
            let start = Instant::now();
            self.http
                .get(url.clone())
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(step_error(step))?
                .bytes()
                .await
                .map_err(step_error(step))?;
            let elapsed = start.elapsed();
            best = Some(best.map_or(elapsed, |current| current.min(elapsed)));
        }

        Ok(best.unwrap_or_default().as_secs_f64() * 1000.0)
    }

    async fn download_one(&self, url: Url) -> std::result::Result<u64, reqwest::Error> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut received = 0u64;
        while let Some(chunk) = stream.next().await {
            received += chunk?.len() as u64;
        }
        Ok(received)
    }

    async fn upload_one(&self, url: Url, size: usize) -> std::result::Result<u64, reqwest::Error> {
        let payload = vec![b'0'; size];
        self.http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(size as u64)
    }
}

/// Sum of the successful transfers, or the first error when all failed
fn total_transferred(
    step: ThroughputStep,
    results: Vec<std::result::Result<u64, reqwest::Error>>,
) -> Result<u64> {
    let mut total = 0u64;
    let mut succeeded = false;
    let mut first_error = None;

    for result in results {
        match result {
            Ok(bytes) => {
                succeeded = true;
                total += bytes;
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    if succeeded {
        Ok(total)
    } else {
        Err(match first_error {
            Some(e) => AppError::speedtest(step, e.to_string()),
            None => AppError::speedtest(step, "no transfers configured"),
        })
    }
}

#[async_trait]
impl ThroughputClient for SpeedtestNetClient {
    async fn select_server(&self, hint: &str) -> Result<SpeedtestServer> {
        let step = ThroughputStep::SelectServer;
        let hint = hint.trim();

        let candidates: Vec<&ServerEntry> = if hint.is_empty() {
            self.servers
                .iter()
                .take(self.settings.candidate_limit.max(1))
                .collect()
        } else {
            self.servers.iter().filter(|server| server.id == hint).collect()
        };

        if candidates.is_empty() {
            return Err(AppError::speedtest(step, format!("no server with id '{}'", hint)));
        }

        let mut fastest: Option<(&ServerEntry, f64)> = None;
        let mut last_error = None;
        for candidate in candidates {
            match self.measure_latency(candidate).await {
                Ok(latency) => {
                    if fastest.map_or(true, |(_, best)| latency < best) {
                        fastest = Some((candidate, latency));
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        match (fastest, last_error) {
            (Some((server, latency)), _) => Ok(server.clone().into_server(latency)),
            (None, Some(e)) => Err(AppError::speedtest(
                step,
                format!("no candidate server answered: {}", e.cause()),
            )),
            (None, None) => Err(AppError::speedtest(step, "no candidate server answered")),
        }
    }

    async fn measure_download(&self, server: &SpeedtestServer) -> Result<f64> {
        let step = ThroughputStep::Download;
        let base = Url::parse(&server.url)
            .map_err(|e| AppError::speedtest(step, format!("invalid server url '{}': {}", server.url, e)))?;

        let mut urls = Vec::with_capacity(self.settings.download_sizes.len());
        for size in &self.settings.download_sizes {
            let url = base
                .join(&format!("random{size}x{size}.jpg"))
                .map_err(|e| AppError::speedtest(step, e.to_string()))?;
            urls.push(url);
        }

        let start = Instant::now();
        let results = join_all(urls.into_iter().map(|url| self.download_one(url))).await;
        let elapsed = start.elapsed();

        let bytes = total_transferred(step, results)?;
        Ok(megabits_per_second(bytes, elapsed))
    }

    async fn measure_upload(&self, server: &SpeedtestServer) -> Result<f64> {
        let step = ThroughputStep::Upload;
        let url = Url::parse(&server.url)
            .map_err(|e| AppError::speedtest(step, format!("invalid server url '{}': {}", server.url, e)))?;

        let start = Instant::now();
        let results = join_all(
            self.settings
                .upload_sizes
                .iter()
                .map(|size| self.upload_one(url.clone(), *size)),
        )
        .await;
        let elapsed = start.elapsed();

        let bytes = total_transferred(step, results)?;
        Ok(megabits_per_second(bytes, elapsed))
    }
}
