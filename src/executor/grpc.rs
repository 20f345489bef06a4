use std::time::Duration;
use tokio::time::{Instant, timeout};
use tonic::Status;
use tonic::codegen::InterceptedService;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::transport::Endpoint;
use tracing::debug;
use url::Url;

use super::FailureKind;
use crate::cache::RequestDescriptor;
use crate::cache::generator::user_agent;
use crate::context::RunContext;
use crate::stats::Protocol;

const CONNECT_FAILED: &str = "gRPC connect failed";

/// `host:port` of the target, with the scheme's default port filled in.
pub fn grpc_target(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "https" { 443 } else { 80 });
    Some(format!("{host}:{port}"))
}

/// Stamps every outgoing call with a request id and the run's user agent.
#[derive(Debug, Clone)]
pub struct CallTags {
    request_id: Option<AsciiMetadataValue>,
    agent: AsciiMetadataValue,
}

impl CallTags {
    pub fn new(agent: &'static str) -> Self {
        Self {
            request_id: AsciiMetadataValue::try_from(rand::random::<u64>().to_string()).ok(),
            agent: AsciiMetadataValue::from_static(agent),
        }
    }
}

impl Interceptor for CallTags {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
        let metadata = request.metadata_mut();
        if let Some(id) = &self.request_id {
            metadata.insert("request-id", id.clone());
        }
        metadata.insert("user-agent", self.agent.clone());
        Ok(request)
    }
}

/// Dials the target in plaintext. Success means the channel came up; no RPC
/// is issued.
pub async fn execute(ctx: &RunContext, descriptor: &RequestDescriptor) {
    let stats = &ctx.stats;
    stats.record_request(Protocol::Grpc);

    let Some(target) = grpc_target(&descriptor.url) else {
        FailureKind::Build.record(stats, "gRPC target parse failed");
        return;
    };
    let agent = user_agent(ctx.config.generation.random_user_agent);
    let dial = Duration::from_secs(ctx.config.grpc.dial_timeout_secs);

    let endpoint = match Endpoint::from_shared(format!("http://{target}"))
        .and_then(|endpoint| endpoint.user_agent(agent))
    {
        Ok(endpoint) => endpoint
            .connect_timeout(ctx.config.http.connect_timeout())
            .tcp_nodelay(true),
        Err(e) => {
            debug!("invalid gRPC endpoint {}: {}", target, e);
            FailureKind::Build.record(stats, "gRPC target parse failed");
            return;
        }
    };

    let started = Instant::now();
    match timeout(dial, endpoint.connect()).await {
        Ok(Ok(channel)) => {
            stats.record_latency(started.elapsed());
            // Dial only: the tagged channel is built but no RPC is issued on it.
            let _client = InterceptedService::new(channel, CallTags::new(agent));
            stats.record_success();
        }
        Ok(Err(e)) => {
            debug!("gRPC dial to {} failed: {}", target, e);
            FailureKind::classify(&e).record(stats, CONNECT_FAILED);
        }
        Err(_) => FailureKind::Timeout.record(stats, CONNECT_FAILED),
    }
}
