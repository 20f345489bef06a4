use serde::Serialize;
use std::time::Duration;

use crate::stats::{RunSummary, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_total(total: f64) -> Self {
        match total {
            t if t >= 90.0 => Grade::S,
            t if t >= 80.0 => Grade::A,
            t if t >= 70.0 => Grade::B,
            t if t >= 60.0 => Grade::C,
            _ => Grade::D,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Grade::S => "S (excellent)",
            Grade::A => "A (good)",
            Grade::B => "B (fair)",
            Grade::C => "C (pass)",
            Grade::D => "D (needs work)",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreCard {
    pub qps: f64, // out of 20
    pub success_rate: f64, // out of 10
    pub latency: f64, // out of 10
    pub error_rate: f64, // out of 15
    pub timeouts: f64, // out of 15
    pub protocols: f64, // out of 20
    pub resources: f64, // out of 10
    pub total: f64,
    pub grade: Grade,
}

impl ScoreCard {
    /// `alive_tasks` is the runtime's task count at the end of the run and
    /// `workers` the configured worker count.
    pub fn compute(
        snapshot: &StatsSnapshot,
        summary: &RunSummary,
        alive_tasks: usize,
        workers: u64,
    ) -> Self {
        if snapshot.requests_sent == 0 {
            return Self {
                qps: 0.0,
                success_rate: 0.0,
                latency: 0.0,
                error_rate: 0.0,
                timeouts: 0.0,
                protocols: 0.0,
                resources: 0.0,
                total: 0.0,
                grade: Grade::D,
            };
        }

        let average = snapshot
            .latency_summary()
            .map(|l| l.average)
            .unwrap_or_default();
        let timeout_rate = snapshot.timeouts as f64 / snapshot.requests_sent as f64 * 100.0;

        let qps = qps_score(summary.requests_per_second);
        let success_rate = success_rate_score(summary.success_rate);
        let latency = latency_score(average);
        let error_rate = error_rate_score(summary.error_rate);
        let timeouts = timeout_score(timeout_rate);
        let protocols = protocol_score(snapshot);
        let resources = resource_score(alive_tasks, workers);

        let total = qps + success_rate + latency + error_rate + timeouts + protocols + resources;
        Self {
            qps,
            success_rate,
            latency,
            error_rate,
            timeouts,
            protocols,
            resources,
            total,
            grade: Grade::from_total(total),
        }
    }

    /// Hints for every category that scored low.
    pub fn suggestions(&self, summary: &RunSummary) -> Vec<String> {
        let mut hints = Vec::new();
        if self.qps < 15.0 {
            hints.push(format!(
                "QPS is low ({:.1}): raise concurrency or tune connection settings",
                summary.requests_per_second
            ));
        }
        if self.success_rate < 8.0 {
            hints.push(format!(
                "success rate is low ({:.1}%): check target load and network stability",
                summary.success_rate
            ));
        }
        if self.latency < 7.0 {
            hints.push("responses are slow: review connection reuse and keep-alive".into());
        }
        if self.timeouts < 10.0 {
            hints.push("many requests timed out: lengthen timeouts or lower concurrency".into());
        }
        if self.protocols < 15.0 {
            hints.push("enable WebSocket, gRPC or HTTP/3 to cover more protocols".into());
        }
        if self.resources < 7.0 {
            hints.push("task count stayed high after the run: look for stuck connections".into());
        }
        hints
    }
}

fn qps_score(qps: f64) -> f64 {
    if qps >= 5000.0 {
        20.0
    } else if qps >= 2000.0 {
        15.0 + (qps - 2000.0) / 3000.0 * 5.0
    } else if qps >= 1000.0 {
        10.0 + (qps - 1000.0) / 1000.0 * 5.0
    } else if qps >= 500.0 {
        5.0 + (qps - 500.0) / 500.0 * 5.0
    } else {
        (qps / 500.0 * 5.0).max(0.0)
    }
}

fn success_rate_score(rate: f64) -> f64 {
    if rate >= 99.5 {
        10.0
    } else if rate >= 95.0 {
        7.0 + (rate - 95.0) / 4.5 * 3.0
    } else if rate >= 90.0 {
        4.0 + (rate - 90.0) / 5.0 * 3.0
    } else {
        (rate / 90.0 * 4.0).max(0.0)
    }
}

fn latency_score(average: Duration) -> f64 {
    let ms = average.as_secs_f64() * 1000.0;
    if ms <= 100.0 {
        10.0
    } else if ms <= 500.0 {
        8.0 + (500.0 - ms) / 400.0 * 2.0
    } else if ms <= 1000.0 {
        5.0 + (1000.0 - ms) / 500.0 * 3.0
    } else if ms <= 3000.0 {
        2.0 + (3000.0 - ms) / 2000.0 * 3.0
    } else {
        (2.0 - (ms - 3000.0) / 2000.0).max(0.0)
    }
}

fn error_rate_score(rate: f64) -> f64 {
    if rate <= 0.5 {
        15.0
    } else if rate <= 2.0 {
        12.0 + (2.0 - rate) / 1.5 * 3.0
    } else if rate <= 5.0 {
        8.0 + (5.0 - rate) / 3.0 * 4.0
    } else if rate <= 10.0 {
        4.0 + (10.0 - rate) / 5.0 * 4.0
    } else {
        (4.0 - rate / 10.0 * 4.0).max(0.0)
    }
}

/// Full marks up to 1% timeouts, then 1.5 points off per extra percent.
fn timeout_score(rate: f64) -> f64 {
    if rate <= 1.0 {
        15.0
    } else {
        (15.0 - (rate - 1.0) * 1.5).max(0.0)
    }
}

fn protocol_score(snapshot: &StatsSnapshot) -> f64 {
    let mut score = 8.0;
    for count in [snapshot.websocket, snapshot.grpc, snapshot.http3] {
        if count > 0 {
            score += 4.0;
        }
    }
    score
}

fn resource_score(alive_tasks: usize, workers: u64) -> f64 {
    let expected = workers as f64 + 50.0;
    let alive = alive_tasks as f64;
    if alive > expected * 2.0 {
        (10.0 - 2.0 * (alive - expected) / expected).max(0.0)
    } else {
        10.0
    }
}
