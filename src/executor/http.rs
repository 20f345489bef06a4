use bytes::Bytes;
use futures::TryStreamExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyDataStream, BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::time::{Instant, timeout};
use tokio_util::io::StreamReader;
use tracing::debug;

use super::{FailureKind, hold};
use crate::cache::RequestDescriptor;
use crate::config::{Config, GenerationConfig, HttpConfig, ReceiveMode};
use crate::context::RunContext;
use crate::readers::{OneByteReader, RateLimitedReader, SlowReader, drain_until};
use crate::stats::{Protocol, Stats};

pub type RequestBody = BoxBody<Bytes, Infallible>;
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

const BODY_READ_FAILED: &str = "response body read failed";

/// Largest frame of a chunked request body.
const CHUNK_SIZE: usize = 2048;
const MULTIPART: &str = "multipart/form-data; boundary=----boundary123";
const CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/x-www-form-urlencoded",
    "text/plain",
    "text/html",
    "application/xml",
    "multipart/form-data",
    "application/octet-stream",
];

pub fn empty_body() -> RequestBody {
    Empty::<Bytes>::new().boxed()
}

/// Response head plus a reader over the body, not yet consumed.
pub struct Exchange {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub secure: bool,
    pub body: BodyReader,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no response headers within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Failed(Box<dyn StdError + Send + Sync>),
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Timeout(_) => FailureKind::Timeout,
            TransportError::Failed(e) => FailureKind::classify(e.as_ref()),
        }
    }
}

/// One request in, one response head out.
pub trait RoundTrip: Send + Sync {
    fn round_trip(
        &self,
        request: Request<RequestBody>,
    ) -> impl Future<Output = Result<Exchange, TransportError>> + Send;
}

/// HTTP/1.1 and HTTP/2 over a pooled hyper client.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, RequestBody>,
}

impl HyperTransport {
    pub fn new(settings: &HttpConfig, tls: ClientConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_connect_timeout(Some(settings.connect_timeout()));
        connector.set_keepalive(Some(Duration::from_secs(settings.keep_alive_secs)));
        connector.set_nodelay(true);

        let builder = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1();
        let https = if settings.http2 {
            builder.enable_http2().wrap_connector(connector)
        } else {
            builder.wrap_connector(connector)
        };

        let max_idle = if settings.connection_reuse {
            settings.max_idle_per_host
        } else {
            0
        };
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .pool_max_idle_per_host(max_idle)
            .build(https);

        Self { client }
    }
}

impl RoundTrip for HyperTransport {
    async fn round_trip(&self, request: Request<RequestBody>) -> Result<Exchange, TransportError> {
        let secure = request.uri().scheme_str() == Some("https");
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Failed(Box::new(e)))?;

        let (parts, body) = response.into_parts();
        let stream = BodyDataStream::new(body).map_err(io::Error::other);
        Ok(Exchange {
            status: parts.status,
            headers: parts.headers,
            secure,
            body: Box::pin(StreamReader::new(stream)),
        })
    }
}

/// Turns a cached descriptor into a request, choosing body framing and
/// content type per call.
pub fn build_request(
    descriptor: &RequestDescriptor,
    generation: &GenerationConfig,
) -> Result<Request<RequestBody>, http::Error> {
    let mut builder = Request::builder()
        .method(descriptor.method.clone())
        .uri(descriptor.url.as_str());

    let with_body = matches!(descriptor.method, Method::POST | Method::PUT | Method::PATCH);
    let body = if with_body {
        let content_type = if generation.multipart && rand::random_bool(0.1) {
            MULTIPART
        } else {
            CONTENT_TYPES[rand::random_range(0..CONTENT_TYPES.len())]
        };
        builder = builder.header(CONTENT_TYPE, content_type);

        if generation.chunked && rand::random_bool(0.1) {
            chunked(descriptor.payload.clone())
        } else {
            Full::new(descriptor.payload.clone()).boxed()
        }
    } else {
        empty_body()
    };

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &descriptor.headers {
            headers.insert(name.clone(), value.clone());
        }
    }
    builder.body(body)
}

/// Streams `payload` in small frames with no declared length, so HTTP/1.1
/// sends it chunked.
fn chunked(payload: Bytes) -> RequestBody {
    let frames: Vec<Result<Frame<Bytes>, Infallible>> = payload
        .chunks(CHUNK_SIZE)
        .map(|chunk| Ok(Frame::data(payload.slice_ref(chunk))))
        .collect();
    StreamBody::new(futures::stream::iter(frames)).boxed()
}

/// Runs one HTTP attempt over `transport` and tallies it under `protocol`.
pub async fn execute<T: RoundTrip>(
    transport: &T,
    ctx: &RunContext,
    descriptor: RequestDescriptor,
    protocol: Protocol,
    mode: ReceiveMode,
) {
    let stats = &ctx.stats;
    let config = &ctx.config;
    stats.record_request(protocol);

    let request = match build_request(&descriptor, &config.generation) {
        Ok(request) => request,
        Err(e) => {
            debug!("failed to build request for {}: {}", descriptor.url, e);
            FailureKind::Build.record(stats, FailureKind::Build.label());
            return;
        }
    };

    let started = Instant::now();
    let header_timeout = config.http.response_header_timeout();
    let result = match timeout(header_timeout, transport.round_trip(request)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(header_timeout)),
    };
    let exchange = match result {
        Ok(exchange) => exchange,
        Err(e) => {
            let kind = e.kind();
            debug!(?protocol, "{} {} failed: {}", descriptor.method, descriptor.url, e);
            kind.record(stats, kind.label());
            return;
        }
    };

    stats.record_latency(started.elapsed());
    if ctx.session.is_tracking() && ctx.session.harvest(&exchange.headers) {
        stats.record_cookie_update();
    }
    if exchange.secure {
        stats.record_tls();
    }

    let deadline = started + config.http.request_timeout();
    consume(ctx, exchange, mode, deadline).await;
}

async fn consume(ctx: &RunContext, exchange: Exchange, mode: ReceiveMode, deadline: Instant) {
    let stats = &ctx.stats;
    let Exchange { status, body, .. } = exchange;

    match mode {
        ReceiveMode::Normal => {
            let (bytes, err) = read_normal(&ctx.config, body, deadline).await;
            stats.record_bytes(bytes);
            record_read_error(stats, bytes, err);
            if status.is_success() {
                stats.record_success();
            } else {
                stats.record_non_success(format!("HTTP_{}", status.as_u16()));
            }
        }
        ReceiveMode::OneByte => {
            let mut reader = OneByteReader::new(body);
            let (bytes, err) = drain_until(&mut reader, deadline).await;
            stats.record_bytes(bytes);
            record_read_error(stats, bytes, err);
            stats.record_one_byte();
        }
        ReceiveMode::SlowReceive => {
            let mut reader = SlowReader::new(body);
            let (bytes, err) = drain_until(&mut reader, deadline).await;
            stats.record_bytes(bytes);
            record_read_error(stats, bytes, err);
            stats.record_slow_receive();
        }
        ReceiveMode::HangUp => {
            stats.record_hanging();
            hold(body, ctx.config.hang_up.pick()).await;
        }
    }
}

// Tallied on top of the status outcome, never instead of it.
fn record_read_error(stats: &Stats, bytes: u64, err: Option<io::Error>) {
    let Some(e) = err else {
        return;
    };
    debug!("response body cut short after {} bytes: {}", bytes, e);
    if e.kind() == io::ErrorKind::TimedOut {
        stats.record_timeout();
    }
    stats.record_error(BODY_READ_FAILED);
}

async fn read_normal(
    config: &Config,
    mut body: BodyReader,
    deadline: Instant,
) -> (u64, Option<io::Error>) {
    let limit = &config.rate_limit;
    if limit.enabled {
        let mut reader = RateLimitedReader::new(
            body,
            Duration::from_secs(limit.window_secs),
            limit.speed_kbps,
        );
        drain_until(&mut reader, deadline).await
    } else {
        drain_until(&mut body, deadline).await
    }
}
