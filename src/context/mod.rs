mod session;

pub use session::SessionJar;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, ReceiveMode};
use crate::error::Result;
use crate::executor::{Http3Transport, HyperTransport};
use crate::stats::Stats;
use crate::tls::TlsProfiles;

pub struct RunContext {
    pub config: Arc<Config>,
    pub stats: Arc<Stats>,
    pub session: Arc<SessionJar>,
    pub tls: TlsProfiles,
    pub http: HyperTransport,
    pub http3: Option<Http3Transport>,
}

impl RunContext {
    /// Builds TLS configs and transports. Must run inside a tokio runtime
    /// when HTTP/3 is enabled.
    pub fn new(config: Config) -> Result<Self> {
        let tls = TlsProfiles::from_config(&config.tls)?;
        let http = HyperTransport::new(&config.http, tls.http.clone());

        let http3 = if config.protocols.http3 {
            let handshake = Duration::from_secs(config.tls.handshake_timeout_secs);
            let transport = Http3Transport::new(tls.quic()?, handshake)?;
            info!("HTTP/3 client ready");
            Some(transport)
        } else {
            None
        };

        Ok(Self {
            session: Arc::new(SessionJar::new(config.generation.fixed_headers)),
            stats: Arc::new(Stats::new()),
            config: Arc::new(config),
            tls,
            http,
            http3,
        })
    }

    pub fn mode(&self) -> ReceiveMode {
        self.config.run.receive_mode
    }
}
