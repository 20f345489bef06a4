pub mod grpc;
pub mod http;
pub mod http3;
pub mod websocket;

pub use http::{
    BodyReader, Exchange, HyperTransport, RequestBody, RoundTrip, TransportError, empty_body,
};
pub use http3::Http3Transport;

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use crate::stats::Stats;

/// Coarse cause of a failed attempt, used for the error tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    ConnectionRefused,
    HostNotFound,
    Build,
    Other,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "request timeout",
            FailureKind::ConnectionRefused => "connection refused",
            FailureKind::HostNotFound => "host not found",
            FailureKind::Build => "request build failed",
            FailureKind::Other => "request failed",
        }
    }

    /// Walks the source chain looking for something recognizable.
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        let mut current = Some(err);
        while let Some(e) = current {
            if e.is::<tokio::time::error::Elapsed>() {
                return FailureKind::Timeout;
            }
            if let Some(io) = e.downcast_ref::<io::Error>() {
                match io.kind() {
                    io::ErrorKind::TimedOut => return FailureKind::Timeout,
                    io::ErrorKind::ConnectionRefused => return FailureKind::ConnectionRefused,
                    _ => {}
                }
            }
            let message = e.to_string().to_lowercase();
            if message.contains("timed out") || message.contains("timeout") {
                return FailureKind::Timeout;
            }
            if message.contains("connection refused") {
                return FailureKind::ConnectionRefused;
            }
            if message.contains("dns error")
                || message.contains("failed to lookup address")
                || message.contains("no such host")
                || message.contains("name or service not known")
            {
                return FailureKind::HostNotFound;
            }
            current = e.source();
        }
        FailureKind::Other
    }

    pub(crate) fn record(self, stats: &Stats, label: &str) {
        if self == FailureKind::Timeout {
            stats.record_timeout();
        }
        stats.record_failure(label);
    }
}

pub(crate) async fn hold<T>(held: T, hang: Duration) {
    tokio::time::sleep(hang).await;
    drop(held);
}
