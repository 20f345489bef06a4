pub mod score;

pub use score::{Grade, ScoreCard};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::stats::{LatencySummary, RunSummary, StatsSnapshot};
use crate::tls::SharedSessionCache;

/// Everything the report needs, gathered once after the pool has joined.
pub struct RunReport<'a> {
    pub config: &'a Config,
    pub snapshot: StatsSnapshot,
    pub summary: RunSummary,
    pub latency: Option<LatencySummary>,
    pub session_cache: Option<&'a SharedSessionCache>,
    pub score: Option<ScoreCard>,
}

impl<'a> RunReport<'a> {
    pub fn new(
        config: &'a Config,
        snapshot: StatsSnapshot,
        elapsed: Duration,
        session_cache: Option<&'a SharedSessionCache>,
    ) -> Self {
        let summary = snapshot.summary(elapsed);
        let latency = snapshot.latency_summary();
        Self {
            config,
            snapshot,
            summary,
            latency,
            session_cache,
            score: None,
        }
    }

    pub fn with_score(mut self, alive_tasks: usize) -> Self {
        self.score = Some(ScoreCard::compute(
            &self.snapshot,
            &self.summary,
            alive_tasks,
            self.config.run.workers,
        ));
        self
    }

    pub fn print(&self) {
        let s = &self.snapshot;
        let sum = &self.summary;
        let rule = "=".repeat(60);

        println!("\n{rule}");
        println!("Run finished ({} receive mode)", self.config.run.receive_mode.label());
        println!("{rule}");
        println!("Duration:          {:.2}s", sum.elapsed_secs);
        println!("Requests sent:     {}", s.requests_sent);
        println!("Successes:         {}", s.successes);
        println!("Non-success:       {}", s.non_success);
        println!("Failed:            {}", s.failed);
        println!("Timeouts:          {}", s.timeouts);
        println!("Requests/sec:      {:.2}", sum.requests_per_second);
        println!("Success rate:      {:.2}%", sum.success_rate);
        println!("Error rate:        {:.2}%", sum.error_rate);
        println!(
            "Received:          {:.2} MB ({:.2} MB/s)",
            s.bytes_received as f64 / (1024.0 * 1024.0),
            sum.megabytes_per_second
        );

        if s.hanging + s.one_byte + s.slow_receive > 0 {
            println!("\nReceive modes:");
            println!("  hanging:         {}", s.hanging);
            println!("  one-byte:        {}", s.one_byte);
            println!("  slow-receive:    {}", s.slow_receive);
        }

        println!("\nProtocols:");
        println!("  HTTP:            {}", s.http);
        println!("  HTTP/3:          {}", s.http3);
        println!("  WebSocket:       {}", s.websocket);
        println!("  gRPC:            {}", s.grpc);
        println!("  TLS connections: {}", s.tls_connections);
        if s.cookie_updates > 0 {
            println!("  cookie updates:  {}", s.cookie_updates);
        }
        if let Some(cache) = self.session_cache {
            println!(
                "  TLS session cache: {} hits / {} misses ({:.1}% hit rate)",
                cache.hits(),
                cache.misses(),
                cache.hit_rate()
            );
        }

        if let Some(l) = &self.latency {
            println!("\nLatency ({} samples):", l.count);
            println!("  avg {:?} | min {:?} | max {:?}", l.average, l.min, l.max);
            println!("  p50 {:?} | p95 {:?} | p99 {:?}", l.p50, l.p95, l.p99);
        }

        if !s.errors.is_empty() {
            println!("\nErrors:");
            let mut errors: Vec<_> = s.errors.iter().collect();
            errors.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (label, count) in errors {
                println!("  {label}: {count}");
            }
        }

        if let Some(card) = &self.score {
            println!("\n{rule}");
            println!("Score card");
            println!("{rule}");
            println!("  QPS              {:5.2}/20", card.qps);
            println!("  success rate     {:5.2}/10", card.success_rate);
            println!("  latency          {:5.2}/10", card.latency);
            println!("  error rate       {:5.2}/15", card.error_rate);
            println!("  timeouts         {:5.2}/15", card.timeouts);
            println!("  protocols        {:5.2}/20", card.protocols);
            println!("  resources        {:5.2}/10", card.resources);
            println!("  total            {:5.2}/100  grade {}", card.total, card.grade.describe());
            for hint in card.suggestions(sum) {
                println!("  - {hint}");
            }
        }
        println!("{rule}");
    }

    /// Writes `report_<YYYYmmdd_HHMMSS>.json` into `dir`.
    pub fn save_json(&self, dir: &Path) -> Result<PathBuf> {
        let now = chrono::Local::now();
        let path = dir.join(format!("report_{}.json", now.format("%Y%m%d_%H%M%S")));

        let document = JsonReport {
            generated_at: now.to_rfc3339(),
            mode: self.config.run.receive_mode.label(),
            config: self.config,
            results: &self.snapshot,
            summary: &self.summary,
            latency_ms: self.latency.as_ref().map(LatencyMillis::from),
            tls_session_cache: self.session_cache.map(|c| SessionCacheStats {
                hits: c.hits(),
                misses: c.misses(),
                hit_rate: c.hit_rate(),
            }),
            score: self.score.as_ref(),
        };

        let json = serde_json::to_string_pretty(&document).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        info!("report saved to {}", path.display());
        Ok(path)
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    mode: &'static str,
    config: &'a Config,
    results: &'a StatsSnapshot,
    summary: &'a RunSummary,
    latency_ms: Option<LatencyMillis>,
    tls_session_cache: Option<SessionCacheStats>,
    score: Option<&'a ScoreCard>,
}

#[derive(Serialize)]
struct LatencyMillis {
    count: usize,
    average: f64,
    min: f64,
    max: f64,
    p50: f64,
    p95: f64,
    p99: f64,
}

impl From<&LatencySummary> for LatencyMillis {
    fn from(l: &LatencySummary) -> Self {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        Self {
            count: l.count,
            average: ms(l.average),
            min: ms(l.min),
            max: ms(l.max),
            p50: ms(l.p50),
            p95: ms(l.p95),
            p99: ms(l.p99),
        }
    }
}

#[derive(Serialize)]
struct SessionCacheStats {
    hits: u64,
    misses: u64,
    hit_rate: f64,
}
