use bytes::Buf;
use http::Request;
use http_body_util::BodyExt;
use quinn::crypto::rustls::QuicClientConfig;
use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::http::{Exchange, RequestBody, RoundTrip, TransportError};
use crate::cache::RequestDescriptor;
use crate::config::ReceiveMode;
use crate::connection_pool::{Http3ConnectionPool, Http3Sender};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::stats::Protocol;

type BoxError = Box<dyn StdError + Send + Sync>;

/// HTTP/3 over QUIC, reusing one connection per authority.
pub struct Http3Transport {
    endpoint: quinn::Endpoint,
    pool: Http3ConnectionPool,
    handshake_timeout: Duration,
}

impl Http3Transport {
    /// `tls` must allow TLS 1.3 and advertise the `h3` ALPN.
    pub fn new(tls: rustls::ClientConfig, handshake_timeout: Duration) -> Result<Self> {
        let crypto = QuicClientConfig::try_from(tls).map_err(|e| Error::Quic(e.to_string()))?;
        let mut endpoint = quinn::Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))?;
        endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(crypto)));

        Ok(Self {
            endpoint,
            pool: Http3ConnectionPool::new(),
            handshake_timeout,
        })
    }

    async fn sender(&self, host: &str, port: u16) -> std::result::Result<Http3Sender, BoxError> {
        let authority = format!("{host}:{port}");
        if let Some(sender) = self.pool.get(&authority) {
            return Ok(sender);
        }

        let bare = host.trim_start_matches('[').trim_end_matches(']');
        let addr = tokio::net::lookup_host((bare, port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("failed to lookup address for {bare}"),
                )
            })?;

        let connecting = self.endpoint.connect(addr, bare)?;
        let connection = timeout(self.handshake_timeout, connecting)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "QUIC handshake timed out"))??;

        let (mut driver, sender) = h3::client::new(h3_quinn::Connection::new(connection)).await?;
        let id = self.pool.insert(&authority, sender.clone());

        let pool = self.pool.clone();
        tokio::spawn(async move {
            let closed = futures::future::poll_fn(|cx| driver.poll_close(cx)).await;
            debug!("HTTP/3 connection to {} closed: {:?}", authority, closed);
            pool.evict(&authority, id);
        });

        Ok(sender)
    }

    async fn send(&self, request: Request<RequestBody>) -> std::result::Result<Exchange, BoxError> {
        let host = request
            .uri()
            .host()
            .ok_or("request URI has no host")?
            .to_owned();
        let port = request.uri().port_u16().unwrap_or(443);
        let mut sender = self.sender(&host, port).await?;

        let (parts, body) = request.into_parts();
        let payload = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        let mut stream = sender.send_request(Request::from_parts(parts, ())).await?;
        if !payload.is_empty() {
            stream.send_data(payload).await?;
        }
        stream.finish().await?;

        let response = stream.recv_response().await?;
        let chunks = futures::stream::unfold(Some(stream), |state| async move {
            let mut stream = state?;
            match stream.recv_data().await {
                Ok(Some(mut chunk)) => {
                    let bytes = chunk.copy_to_bytes(chunk.remaining());
                    Some((Ok(bytes), Some(stream)))
                }
                Ok(None) => None,
                Err(e) => Some((Err(io::Error::other(e.to_string())), None)),
            }
        });

        Ok(Exchange {
            status: response.status(),
            headers: response.headers().clone(),
            secure: true,
            body: Box::pin(StreamReader::new(Box::pin(chunks))),
        })
    }
}

impl RoundTrip for Http3Transport {
    async fn round_trip(
        &self,
        request: Request<RequestBody>,
    ) -> std::result::Result<Exchange, TransportError> {
        self.send(request).await.map_err(TransportError::Failed)
    }
}

/// Counts the attempt as HTTP/3 and runs it through the shared HTTP path.
pub async fn execute(ctx: &RunContext, descriptor: RequestDescriptor, mode: ReceiveMode) {
    match &ctx.http3 {
        Some(transport) => {
            super::http::execute(transport, ctx, descriptor, Protocol::Http3, mode).await;
        }
        None => {
            ctx.stats.record_request(Protocol::Http3);
            ctx.stats.record_failure("HTTP/3 client not initialised");
        }
    }
}
