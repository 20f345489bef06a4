use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};

/// How every executor consumes responses for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveMode {
    /// Read the whole response.
    #[default]
    Normal,
    /// Connect, then hold the connection open without reading.
    HangUp,
    /// Read a single byte and walk away.
    OneByte,
    /// Read one byte at a time with a pause between reads.
    SlowReceive,
}

impl ReceiveMode {
    pub fn label(&self) -> &'static str {
        match self {
            ReceiveMode::Normal => "normal",
            ReceiveMode::HangUp => "hang-up",
            ReceiveMode::OneByte => "one-byte",
            ReceiveMode::SlowReceive => "slow-receive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TlsVersion {
    #[serde(rename = "1.0")]
    Tls10,
    #[serde(rename = "1.1")]
    Tls11,
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub http: HttpConfig,
    pub tls: TlsConfig,
    pub protocols: ProtocolConfig,
    pub generation: GenerationConfig,
    pub rate_limit: RateLimitConfig,
    pub hang_up: HangUpConfig,
    pub websocket: WebSocketConfig,
    pub grpc: GrpcConfig,
    pub report: ReportConfig,
    pub health_check: HealthCheckConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RunConfig {
    pub total_requests: u64,
    pub workers: u64,
    pub cache_size: usize,
    pub receive_mode: ReceiveMode,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub targets_file: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_requests: 100_000,
            workers: 1_000,
            cache_size: 20_000,
            receive_mode: ReceiveMode::Normal,
            batch_size: 50,
            batch_delay_ms: 100,
            targets_file: PathBuf::from("targets.txt"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    pub response_header_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub keep_alive_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_idle_per_host: usize,
    pub connection_reuse: bool,
    pub compression: bool,
    pub http2: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 45,
            response_header_timeout_secs: 15,
            connect_timeout_secs: 30,
            keep_alive_secs: 60,
            idle_timeout_secs: 60,
            max_idle_per_host: 20_000,
            connection_reuse: true,
            compression: true,
            http2: true,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_secs(self.response_header_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TlsConfig {
    pub ignore_errors: bool,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    pub handshake_timeout_secs: u64,
    pub new_session_per_connection: bool,
    pub shared_session_cache: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ignore_errors: true,
            min_version: TlsVersion::Tls10,
            max_version: TlsVersion::Tls13,
            handshake_timeout_secs: 15,
            new_session_per_connection: false,
            shared_session_cache: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProtocolConfig {
    pub websocket: bool,
    pub grpc: bool,
    pub http3: bool,
    // Cumulative cutoffs on the 0..100 draw, in dispatch order.
    pub http3_cutoff: u32,
    pub websocket_cutoff: u32,
    pub grpc_cutoff: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            websocket: false,
            grpc: false,
            http3: false,
            http3_cutoff: 5,
            websocket_cutoff: 15,
            grpc_cutoff: 20,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub random_path: bool,
    pub random_query: bool,
    pub random_method: bool,
    pub multipart: bool,
    pub chunked: bool,
    pub random_user_agent: bool,
    pub fixed_headers: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            random_path: true,
            random_query: true,
            random_method: true,
            multipart: true,
            chunked: true,
            random_user_agent: true,
            fixed_headers: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_secs: u64,
    pub speed_kbps: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_secs: 15,
            speed_kbps: 2048,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HangUpConfig {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for HangUpConfig {
    fn default() -> Self {
        Self {
            min_secs: 30,
            max_secs: 210,
        }
    }
}

impl HangUpConfig {
    /// Random hold time in `[min_secs, max_secs)`.
    pub fn pick(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs(self.min_secs);
        }
        Duration::from_secs(rand::random_range(self.min_secs..self.max_secs))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct WebSocketConfig {
    pub handshake_timeout_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GrpcConfig {
    pub dial_timeout_secs: u64,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub progress: bool,
    pub interval_secs: u64,
    pub scoring: bool,
    pub save_json: bool,
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            progress: true,
            interval_secs: 3,
            scoring: true,
            save_json: true,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub required: bool,
    pub timeout_secs: u64,
    pub max_targets: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            timeout_secs: 10,
            max_targets: 5,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reads `path` if it exists, otherwise starts from the defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            info!("{} not found, using built-in defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Rejects settings that make a run meaningless. Called once before any
    /// worker starts.
    pub fn validate(&self) -> Result<()> {
        let run = &self.run;
        if run.total_requests == 0 || run.workers == 0 {
            return Err(Error::Config(
                "total_requests and workers must be greater than 0".into(),
            ));
        }
        if run.workers > run.total_requests {
            return Err(Error::Config(format!(
                "workers ({}) cannot exceed total_requests ({})",
                run.workers, run.total_requests
            )));
        }
        if run.cache_size == 0 {
            return Err(Error::Config("cache_size must be greater than 0".into()));
        }
        if run.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".into()));
        }
        if self.tls.min_version > self.tls.max_version {
            return Err(Error::Config(format!(
                "tls.min_version {:?} is above tls.max_version {:?}",
                self.tls.min_version, self.tls.max_version
            )));
        }
        if self.hang_up.min_secs > self.hang_up.max_secs {
            return Err(Error::Config(
                "hang_up.min_secs cannot exceed hang_up.max_secs".into(),
            ));
        }
        if self.rate_limit.enabled && self.rate_limit.speed_kbps == 0 {
            return Err(Error::Config(
                "rate_limit.speed_kbps must be greater than 0".into(),
            ));
        }
        let p = &self.protocols;
        let mut previous = 0;
        for (name, enabled, cutoff) in [
            ("http3", p.http3, p.http3_cutoff),
            ("websocket", p.websocket, p.websocket_cutoff),
            ("grpc", p.grpc, p.grpc_cutoff),
        ] {
            if !enabled {
                continue;
            }
            if cutoff > 100 || cutoff < previous {
                return Err(Error::Config(format!(
                    "protocols.{name}_cutoff must lie in {previous}..=100, got {cutoff}"
                )));
            }
            previous = cutoff;
        }
        Ok(())
    }
}
