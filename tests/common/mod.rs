#![allow(dead_code)]

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::SET_COOKIE;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use http::HeaderValue;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use trafgen::cache::{RequestCache, RequestGenerator};
use trafgen::config::Config;
use trafgen::context::RunContext;

pub const DEFAULT_BODY: &[u8] = b"{\"status\":\"ok\",\"source\":\"test server\"}";

/// What every request to a test server gets back.
#[derive(Debug, Clone, Copy)]
pub struct Reply {
    pub status: StatusCode,
    pub body: &'static [u8],
    pub set_cookie: Option<&'static str>,
}

impl Default for Reply {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            body: DEFAULT_BODY,
            set_cookie: None,
        }
    }
}

/// HTTP/1.1 server on an ephemeral port that reads every body and answers 200.
pub async fn spawn_http_server() -> SocketAddr {
    spawn_http_server_with(Reply::default()).await
}

pub async fn spawn_http_server_with(reply: Reply) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service_fn(move |request| respond(request, reply)))
                    .await;
            });
        }
    });
    addr
}

async fn respond(
    request: Request<Incoming>,
    reply: Reply,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let _ = request.into_body().collect().await;
    let mut response = Response::new(Full::new(Bytes::from_static(reply.body)));
    *response.status_mut() = reply.status;
    if let Some(cookie) = reply.set_cookie {
        response
            .headers_mut()
            .insert(SET_COOKIE, HeaderValue::from_static(cookie));
    }
    Ok(response)
}

/// Announces a 100000 byte body, sends three bytes and closes. Only suited
/// to bodiless requests: the request head is read with a single `read`.
pub async fn spawn_truncating_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut head = [0u8; 8192];
                if stream.read(&mut head).await.is_err() {
                    return;
                }
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\nabc")
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

/// WebSocket server that echoes text frames back.
pub async fn spawn_websocket_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() && ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// Small, quiet configuration aimed at local servers.
pub fn local_config(total: u64, workers: u64) -> Config {
    let mut config = Config::default();
    config.run.total_requests = total;
    config.run.workers = workers;
    config.run.cache_size = 64;
    config.run.batch_size = 5;
    config.run.batch_delay_ms = 10;
    config.http.response_header_timeout_secs = 5;
    config.http.request_timeout_secs = 10;
    config.health_check.enabled = false;
    config.report.progress = false;
    config.report.save_json = false;
    config
}

/// Context and filled cache for `target`.
pub fn prepare(config: Config, target: Url) -> (Arc<RunContext>, Arc<RequestCache>) {
    config.validate().unwrap();
    let ctx = Arc::new(RunContext::new(config).unwrap());
    let generator = Arc::new(
        RequestGenerator::new(
            vec![target].into(),
            ctx.config.generation.clone(),
            ctx.config.http.compression,
            ctx.session.clone(),
        )
        .unwrap(),
    );
    let cache = Arc::new(
        RequestCache::initialize(ctx.config.run.cache_size, generator, ctx.session.clone())
            .unwrap(),
    );
    (ctx, cache)
}
