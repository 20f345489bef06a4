use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const LATENCY_CAPACITY: usize = 50_000;
// oldest samples dropped in one batch once the ceiling is hit
pub const LATENCY_EVICTION: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Http3,
    WebSocket,
    Grpc,
}

#[derive(Debug, Default)]
struct Samples {
    latencies: Vec<Duration>,
    errors: HashMap<String, u64>,
}

#[derive(Debug)]
pub struct Stats {
    started: Instant,
    requests_sent: AtomicU64,
    successes: AtomicU64,
    non_success: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    bytes_received: AtomicU64,
    hanging: AtomicU64,
    one_byte: AtomicU64,
    slow_receive: AtomicU64,
    http: AtomicU64,
    http3: AtomicU64,
    websocket: AtomicU64,
    grpc: AtomicU64,
    tls_connections: AtomicU64,
    cookie_updates: AtomicU64,
    samples: RwLock<Samples>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests_sent: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            non_success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            hanging: AtomicU64::new(0),
            one_byte: AtomicU64::new(0),
            slow_receive: AtomicU64::new(0),
            http: AtomicU64::new(0),
            http3: AtomicU64::new(0),
            websocket: AtomicU64::new(0),
            grpc: AtomicU64::new(0),
            tls_connections: AtomicU64::new(0),
            cookie_updates: AtomicU64::new(0),
            samples: RwLock::new(Samples {
                latencies: Vec::with_capacity(10_000),
                errors: HashMap::new(),
            }),
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn record_request(&self, protocol: Protocol) {
        bump(&self.requests_sent);
        bump(match protocol {
            Protocol::Http => &self.http,
            Protocol::Http3 => &self.http3,
            Protocol::WebSocket => &self.websocket,
            Protocol::Grpc => &self.grpc,
        });
    }

    pub fn record_success(&self) {
        bump(&self.successes);
    }

    /// A completed exchange whose status fell outside the success range.
    pub fn record_non_success(&self, label: impl Into<String>) {
        bump(&self.non_success);
        self.record_error(label);
    }

    pub fn record_failure(&self, label: impl Into<String>) {
        bump(&self.failed);
        self.record_error(label);
    }

    pub fn record_timeout(&self) {
        bump(&self.timeouts);
    }

    pub fn record_bytes(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_hanging(&self) {
        bump(&self.hanging);
    }

    pub fn record_one_byte(&self) {
        bump(&self.one_byte);
    }

    pub fn record_slow_receive(&self) {
        bump(&self.slow_receive);
    }

    pub fn record_tls(&self) {
        bump(&self.tls_connections);
    }

    pub fn record_cookie_update(&self) {
        bump(&self.cookie_updates);
    }

    pub fn record_error(&self, label: impl Into<String>) {
        let mut samples = self.samples.write();
        *samples.errors.entry(label.into()).or_insert(0) += 1;
    }

    pub fn record_latency(&self, latency: Duration) {
        let mut samples = self.samples.write();
        if samples.latencies.len() >= LATENCY_CAPACITY {
            samples.latencies.drain(..LATENCY_EVICTION);
        }
        samples.latencies.push(latency);
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn latency_samples(&self) -> usize {
        self.samples.read().latencies.len()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let samples = self.samples.read();
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            requests_sent: load(&self.requests_sent),
            successes: load(&self.successes),
            non_success: load(&self.non_success),
            failed: load(&self.failed),
            timeouts: load(&self.timeouts),
            bytes_received: load(&self.bytes_received),
            hanging: load(&self.hanging),
            one_byte: load(&self.one_byte),
            slow_receive: load(&self.slow_receive),
            http: load(&self.http),
            http3: load(&self.http3),
            websocket: load(&self.websocket),
            grpc: load(&self.grpc),
            tls_connections: load(&self.tls_connections),
            cookie_updates: load(&self.cookie_updates),
            latencies: samples.latencies.clone(),
            errors: samples.errors.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub requests_sent: u64,
    pub successes: u64,
    pub non_success: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub bytes_received: u64,
    pub hanging: u64,
    pub one_byte: u64,
    pub slow_receive: u64,
    pub http: u64,
    pub http3: u64,
    pub websocket: u64,
    pub grpc: u64,
    pub tls_connections: u64,
    pub cookie_updates: u64,
    #[serde(skip)]
    pub latencies: Vec<Duration>,
    pub errors: HashMap<String, u64>,
}

impl StatsSnapshot {
    pub fn latency_summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.latencies)
    }

    pub fn summary(&self, elapsed: Duration) -> RunSummary {
        let secs = elapsed.as_secs_f64();
        let sent = self.requests_sent as f64;
        let ratio = |n: u64| {
            if self.requests_sent == 0 {
                0.0
            } else {
                n as f64 / sent * 100.0
            }
        };
        RunSummary {
            elapsed_secs: secs,
            requests_per_second: if secs > 0.0 { sent / secs } else { 0.0 },
            success_rate: ratio(self.successes),
            error_rate: ratio(self.failed),
            megabytes_per_second: if secs > 0.0 {
                self.bytes_received as f64 / (1024.0 * 1024.0) / secs
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunSummary {
    pub elapsed_secs: f64,
    pub requests_per_second: f64,
    /// Percent of sent requests that completed with a success status.
    pub success_rate: f64,
    /// Percent of sent requests that failed before a response.
    pub error_rate: f64,
    pub megabytes_per_second: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl LatencySummary {
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let len = sorted.len();
        let at = |fraction: f64| sorted[((len as f64 * fraction) as usize).min(len - 1)];
        let total: Duration = sorted.iter().sum();

        Some(Self {
            count: len,
            average: total / len as u32,
            min: sorted[0],
            max: sorted[len - 1],
            p50: sorted[len / 2],
            p95: at(0.95),
            p99: at(0.99),
        })
    }
}
