use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use super::{FailureKind, hold};
use crate::cache::RequestDescriptor;
use crate::config::ReceiveMode;
use crate::connection_pool::configure_keepalive;
use crate::context::RunContext;
use crate::stats::{Protocol, Stats};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const NORMAL_READ_TIMEOUT: Duration = Duration::from_secs(5);
const ONE_BYTE_READ_TIMEOUT: Duration = Duration::from_secs(1);
const SLOW_READ_TIMEOUT: Duration = Duration::from_secs(2);
const SLOW_READS: usize = 3;

const CONNECT_FAILED: &str = "WebSocket connect failed";
const READ_FAILED: &str = "WebSocket read failed";

/// `http` becomes `ws` and `https` becomes `wss`; everything else is kept.
pub fn websocket_url(target: &Url) -> Url {
    let mut url = target.clone();
    let scheme = if target.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) stays within the special schemes, so this cannot fail.
    let _ = url.set_scheme(scheme);
    url
}

#[derive(Debug)]
enum Handshake {
    TimedOut,
    Rejected(u16),
    Failed(tungstenite::Error),
}

pub async fn execute(ctx: &RunContext, descriptor: RequestDescriptor, mode: ReceiveMode) {
    let stats = &ctx.stats;
    stats.record_request(Protocol::WebSocket);

    let url = websocket_url(&descriptor.url);
    let started = Instant::now();
    let handshake_timeout = Duration::from_secs(ctx.config.websocket.handshake_timeout_secs);

    let mut socket = match timeout(handshake_timeout, connect(ctx, &url, &descriptor)).await {
        Ok(Ok(socket)) => socket,
        Ok(Err(Handshake::Rejected(status))) => {
            stats.record_latency(started.elapsed());
            stats.record_non_success(format!("WebSocket_HTTP_{status}"));
            return;
        }
        Ok(Err(Handshake::Failed(e))) => {
            debug!("WebSocket handshake with {} failed: {}", url, e);
            FailureKind::classify(&e).record(stats, CONNECT_FAILED);
            return;
        }
        Ok(Err(Handshake::TimedOut)) | Err(_) => {
            FailureKind::Timeout.record(stats, CONNECT_FAILED);
            return;
        }
    };

    stats.record_latency(started.elapsed());
    if url.scheme() == "wss" {
        stats.record_tls();
    }

    if let Err(e) = socket.send(Message::text(test_message())).await {
        debug!("WebSocket send to {} failed: {}", url, e);
        FailureKind::classify(&e).record(stats, "WebSocket send failed");
        return;
    }

    match mode {
        ReceiveMode::Normal => match read_one(&mut socket, NORMAL_READ_TIMEOUT).await {
            Ok(len) => {
                stats.record_bytes(len);
                stats.record_success();
            }
            Err(kind) => kind.record(stats, READ_FAILED),
        },
        ReceiveMode::OneByte => {
            if let Ok(len) = read_one(&mut socket, ONE_BYTE_READ_TIMEOUT).await {
                stats.record_bytes(len.min(1));
            }
            stats.record_one_byte();
        }
        ReceiveMode::SlowReceive => {
            read_slowly(&mut socket, stats).await;
            stats.record_slow_receive();
        }
        ReceiveMode::HangUp => {
            stats.record_hanging();
            hold(socket, ctx.config.hang_up.pick()).await;
        }
    }
}

async fn connect(
    ctx: &RunContext,
    url: &Url,
    descriptor: &RequestDescriptor,
) -> Result<Socket, Handshake> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(Handshake::Failed)?;
    for (name, value) in &descriptor.headers {
        request.headers_mut().insert(name.clone(), value.clone());
    }

    let host = url.host_str().unwrap_or_default();
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url.port_or_known_default().unwrap_or(80);
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| Handshake::Failed(e.into()))?;
    configure_keepalive(&stream, Duration::from_secs(ctx.config.http.keep_alive_secs))
        .map_err(|e| Handshake::Failed(e.into()))?;

    let connector = if url.scheme() == "wss" {
        Connector::Rustls(ctx.tls.websocket.clone())
    } else {
        Connector::Plain
    };

    match tokio_tungstenite::client_async_tls_with_config(request, stream, None, Some(connector))
        .await
    {
        Ok((socket, _response)) => Ok(socket),
        Err(tungstenite::Error::Http(response)) => {
            Err(Handshake::Rejected(response.status().as_u16()))
        }
        Err(tungstenite::Error::Io(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
            Err(Handshake::TimedOut)
        }
        Err(e) => Err(Handshake::Failed(e)),
    }
}

/// Waits for one message and returns its length.
async fn read_one(socket: &mut Socket, limit: Duration) -> Result<u64, FailureKind> {
    match timeout(limit, socket.next()).await {
        Ok(Some(Ok(message))) => Ok(message.len() as u64),
        Ok(Some(Err(e))) => Err(FailureKind::classify(&e)),
        Ok(None) => Err(FailureKind::Other),
        Err(_) => Err(FailureKind::Timeout),
    }
}

async fn read_slowly(socket: &mut Socket, stats: &Stats) {
    for _ in 0..SLOW_READS {
        match read_one(socket, SLOW_READ_TIMEOUT).await {
            Ok(len) => stats.record_bytes(len),
            Err(_) => break,
        }
        sleep(Duration::from_millis(rand::random_range(300..1300))).await;
    }
}

fn test_message() -> String {
    serde_json::json!({
        "type": "performance_test",
        "data": "load_test_message",
        "timestamp": chrono::Utc::now().timestamp(),
        "id": rand::random::<i64>(),
    })
    .to_string()
}
