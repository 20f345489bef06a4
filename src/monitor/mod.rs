use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::error;

use crate::stats::Stats;

/// Periodic one-line progress report on stdout.
pub struct ProgressMonitor {
    stats: Arc<Stats>,
    total: u64,
    interval: Duration,
}

/// Running monitor; [`MonitorHandle::stop`] ends it and prints a final line.
pub struct MonitorHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ProgressMonitor {
    pub fn new(stats: Arc<Stats>, total: u64, interval: Duration) -> Self {
        Self {
            stats,
            total,
            interval: interval.max(Duration::from_millis(100)),
        }
    }

    pub fn spawn(self) -> MonitorHandle {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(self.run(stopped));
        MonitorHandle { stop, task }
    }

    async fn run(self, mut stopped: oneshot::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_sent = 0;
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sent = self.stats.requests_sent();
                    let window = last_tick.elapsed().as_secs_f64();
                    let rps = if window > 0.0 {
                        sent.saturating_sub(last_sent) as f64 / window
                    } else {
                        0.0
                    };
                    last_sent = sent;
                    last_tick = Instant::now();

                    print!("\r{}", self.line(rps));
                    let _ = std::io::stdout().flush();
                }
                _ = &mut stopped => break,
            }
        }

        let elapsed = self.stats.started().elapsed().as_secs_f64();
        let average = if elapsed > 0.0 {
            self.stats.requests_sent() as f64 / elapsed
        } else {
            0.0
        };
        println!("\r{}", self.line(average));
    }

    fn line(&self, rps: f64) -> String {
        progress_line(
            self.stats.requests_sent(),
            self.stats.successes(),
            self.stats.failed(),
            self.total,
            rps,
        )
    }
}

impl MonitorHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            error!("progress monitor task failed: {}", e);
        }
    }
}

/// `[ 42.0%] 420/1000 | 123.4 req/s | success 97.6% | failed 3`
pub fn progress_line(sent: u64, successes: u64, failed: u64, total: u64, rps: f64) -> String {
    let progress = if total == 0 {
        0.0
    } else {
        (sent as f64 / total as f64 * 100.0).min(100.0)
    };
    let success = if sent == 0 {
        0.0
    } else {
        successes as f64 / sent as f64 * 100.0
    };
    format!(
        "[{:5.1}%] {}/{} | {:.1} req/s | success {:.1}% | failed {}",
        progress, sent, total, rps, success, failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Protocol;

    #[test]
    fn test_progress_line_format() {
        let line = progress_line(420, 410, 3, 1000, 123.44);
        assert_eq!(
            line,
            "[ 42.0%] 420/1000 | 123.4 req/s | success 97.6% | failed 3"
        );
    }

    #[test]
    fn test_progress_line_empty_run() {
        let line = progress_line(0, 0, 0, 0, 0.0);
        assert!(line.starts_with("[  0.0%] 0/0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_on_signal() {
        let stats = Arc::new(Stats::new());
        let handle = ProgressMonitor::new(stats.clone(), 10, Duration::from_secs(3)).spawn();

        for _ in 0..5 {
            stats.record_request(Protocol::Http);
        }
        time::sleep(Duration::from_secs(7)).await;
        handle.stop().await;
        assert_eq!(stats.requests_sent(), 5);
    }
}
