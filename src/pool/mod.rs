use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info};

use crate::cache::RequestCache;
use crate::config::{ProtocolConfig, ReceiveMode};
use crate::context::RunContext;
use crate::executor::{grpc, http, http3, websocket};
use crate::stats::Protocol;

pub const SELECTOR_RANGE: u32 = 100;

/// Requests owed by `worker_id`. The first `total % workers` workers take one
/// extra so the quotas add up to `total` exactly.
pub fn quota(total: u64, workers: u64, worker_id: u64) -> u64 {
    if workers == 0 {
        return 0;
    }
    let base = total / workers;
    if worker_id < total % workers {
        base + 1
    } else {
        base
    }
}

/// Maps a draw in `0..100` to a protocol through fixed cumulative cutoffs.
/// An enabled protocol owns the draws from the previous enabled cutoff up to
/// its own; HTTP owns whatever lies above the last one.
#[derive(Debug, Clone)]
pub struct ProtocolSelector {
    bands: Vec<(u32, Protocol)>,
}

impl ProtocolSelector {
    pub fn from_config(protocols: &ProtocolConfig) -> Self {
        let mut bands = Vec::with_capacity(3);
        let mut upper = 0;
        for (enabled, cutoff, protocol) in [
            (protocols.http3, protocols.http3_cutoff, Protocol::Http3),
            (protocols.websocket, protocols.websocket_cutoff, Protocol::WebSocket),
            (protocols.grpc, protocols.grpc_cutoff, Protocol::Grpc),
        ] {
            if enabled && cutoff.min(SELECTOR_RANGE) > upper {
                upper = cutoff.min(SELECTOR_RANGE);
                bands.push((upper, protocol));
            }
        }
        Self { bands }
    }

    pub fn pick(&self) -> Protocol {
        if self.bands.is_empty() {
            return Protocol::Http;
        }
        self.resolve(rand::random_range(0..SELECTOR_RANGE))
    }

    pub fn resolve(&self, draw: u32) -> Protocol {
        self.bands
            .iter()
            .find(|(upper, _)| draw < *upper)
            .map(|(_, protocol)| *protocol)
            .unwrap_or(Protocol::Http)
    }
}

pub struct WorkerPool {
    ctx: Arc<RunContext>,
    cache: Arc<RequestCache>,
    selector: Arc<ProtocolSelector>,
}

impl WorkerPool {
    pub fn new(ctx: Arc<RunContext>, cache: Arc<RequestCache>) -> Self {
        let selector = Arc::new(ProtocolSelector::from_config(&ctx.config.protocols));
        Self {
            ctx,
            cache,
            selector,
        }
    }

    pub async fn run(&self) -> Duration {
        let run = &self.ctx.config.run;
        let batch_delay = Duration::from_millis(run.batch_delay_ms);
        let mode = self.ctx.mode();
        let started = Instant::now();

        info!(
            workers = run.workers,
            total = run.total_requests,
            mode = mode.label(),
            "starting workers"
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(run.workers as usize);
        let mut next = 0u64;
        while next < run.workers {
            if next > 0 {
                sleep(batch_delay).await;
            }
            let end = (next + run.batch_size as u64).min(run.workers);
            for worker_id in next..end {
                let owed = quota(run.total_requests, run.workers, worker_id);
                handles.push(tokio::spawn(worker(
                    self.ctx.clone(),
                    self.cache.clone(),
                    self.selector.clone(),
                    owed,
                    mode,
                )));
            }
            debug!("launched workers {}..{}", next, end);
            next = end;
        }
        info!("all {} workers launched", handles.len());

        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker task failed: {}", e);
            }
        }
        started.elapsed()
    }
}

async fn worker(
    ctx: Arc<RunContext>,
    cache: Arc<RequestCache>,
    selector: Arc<ProtocolSelector>,
    owed: u64,
    mode: ReceiveMode,
) {
    for _ in 0..owed {
        let descriptor = cache.get();
        match selector.pick() {
            Protocol::Http => {
                http::execute(&ctx.http, &ctx, descriptor, Protocol::Http, mode).await;
            }
            Protocol::Http3 => http3::execute(&ctx, descriptor, mode).await,
            Protocol::WebSocket => websocket::execute(&ctx, descriptor, mode).await,
            Protocol::Grpc => grpc::execute(&ctx, &descriptor).await,
        }

        if rand::random_bool(0.05) {
            sleep(Duration::from_millis(rand::random_range(10..60))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_sums_to_total() {
        for total in [1u64, 7, 100, 999, 100_000] {
            for workers in [1u64, 2, 3, 7, 50, 1_000] {
                if workers > total {
                    continue;
                }
                let quotas: Vec<u64> = (0..workers).map(|w| quota(total, workers, w)).collect();
                assert_eq!(quotas.iter().sum::<u64>(), total, "T={total} W={workers}");

                let max = *quotas.iter().max().unwrap();
                let min = *quotas.iter().min().unwrap();
                assert!(max - min <= 1);
                // extras go to the lowest ids
                assert!(quotas.windows(2).all(|w| w[0] >= w[1]));
            }
        }
    }

    #[test]
    fn test_quota_zero_workers() {
        assert_eq!(quota(10, 0, 0), 0);
    }

    fn protocols(http3: bool, websocket: bool, grpc: bool) -> ProtocolConfig {
        ProtocolConfig {
            http3,
            websocket,
            grpc,
            ..ProtocolConfig::default()
        }
    }

    #[test]
    fn test_http_only_when_nothing_enabled() {
        let selector = ProtocolSelector::from_config(&protocols(false, false, false));
        for _ in 0..1_000 {
            assert_eq!(selector.pick(), Protocol::Http);
        }
    }

    #[test]
    fn test_bands_with_everything_enabled() {
        let selector = ProtocolSelector::from_config(&protocols(true, true, true));
        assert_eq!(selector.resolve(0), Protocol::Http3);
        assert_eq!(selector.resolve(4), Protocol::Http3);
        assert_eq!(selector.resolve(5), Protocol::WebSocket);
        assert_eq!(selector.resolve(14), Protocol::WebSocket);
        assert_eq!(selector.resolve(15), Protocol::Grpc);
        assert_eq!(selector.resolve(19), Protocol::Grpc);
        assert_eq!(selector.resolve(20), Protocol::Http);
        assert_eq!(selector.resolve(99), Protocol::Http);
    }

    #[test]
    fn test_disabled_slice_goes_to_next_enabled_band() {
        let selector = ProtocolSelector::from_config(&protocols(false, true, true));
        assert_eq!(selector.resolve(0), Protocol::WebSocket);
        assert_eq!(selector.resolve(14), Protocol::WebSocket);
        assert_eq!(selector.resolve(15), Protocol::Grpc);
        assert_eq!(selector.resolve(19), Protocol::Grpc);
        assert_eq!(selector.resolve(20), Protocol::Http);

        let grpc_only = ProtocolSelector::from_config(&protocols(false, false, true));
        assert_eq!(grpc_only.resolve(0), Protocol::Grpc);
        assert_eq!(grpc_only.resolve(19), Protocol::Grpc);
        assert_eq!(grpc_only.resolve(20), Protocol::Http);

        let http3_and_grpc = ProtocolSelector::from_config(&protocols(true, false, true));
        assert_eq!(http3_and_grpc.resolve(4), Protocol::Http3);
        assert_eq!(http3_and_grpc.resolve(5), Protocol::Grpc);
        assert_eq!(http3_and_grpc.resolve(19), Protocol::Grpc);
    }

    #[test]
    fn test_pick_distribution_follows_cutoffs() {
        let selector = ProtocolSelector::from_config(&protocols(false, true, false));
        let draws = 20_000;
        let ws = (0..draws)
            .filter(|_| selector.pick() == Protocol::WebSocket)
            .count();
        let share = ws as f64 / draws as f64;
        assert!((0.12..0.18).contains(&share), "websocket share {share}");
    }
}
