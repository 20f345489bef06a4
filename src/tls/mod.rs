use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{ClientSessionMemoryCache, ClientSessionStore, Resumption, Tls12ClientSessionValue, Tls13ClientSessionValue};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms, ring};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, NamedGroup, RootCertStore, SignatureScheme, SupportedProtocolVersion};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use crate::config::{TlsConfig, TlsVersion};
use crate::error::{Error, Result};

/// Session entries kept per cache. Matches rustls' own default store size.
const SESSION_CACHE_SIZE: usize = 256;

/// Process-wide TLS session store with hit/miss accounting.
#[derive(Debug)]
pub struct SharedSessionCache {
    inner: ClientSessionMemoryCache,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SharedSessionCache {
    pub fn new(size: usize) -> Self {
        Self {
            inner: ClientSessionMemoryCache::new(size),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Percentage of lookups that found a resumable session.
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = (self.hits(), self.misses());
        if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64 * 100.0
        }
    }

    fn count<T>(&self, found: Option<T>) -> Option<T> {
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }
}

impl ClientSessionStore for SharedSessionCache {
    fn set_kx_hint(&self, server_name: ServerName<'static>, group: NamedGroup) {
        self.inner.set_kx_hint(server_name, group);
    }

    fn kx_hint(&self, server_name: &ServerName<'_>) -> Option<NamedGroup> {
        self.inner.kx_hint(server_name)
    }

    fn set_tls12_session(&self, server_name: ServerName<'static>, value: Tls12ClientSessionValue) {
        self.inner.set_tls12_session(server_name, value);
    }

    fn tls12_session(&self, server_name: &ServerName<'_>) -> Option<Tls12ClientSessionValue> {
        self.count(self.inner.tls12_session(server_name))
    }

    fn remove_tls12_session(&self, server_name: &ServerName<'static>) {
        self.inner.remove_tls12_session(server_name);
    }

    fn insert_tls13_ticket(&self, server_name: ServerName<'static>, value: Tls13ClientSessionValue) {
        self.inner.insert_tls13_ticket(server_name, value);
    }

    fn take_tls13_ticket(&self, server_name: &ServerName<'static>) -> Option<Tls13ClientSessionValue> {
        self.count(self.inner.take_tls13_ticket(server_name))
    }
}

/// Client configs for each transport, built from one [`TlsConfig`].
#[derive(Debug, Clone)]
pub struct TlsProfiles {
    // hyper-rustls sets ALPN itself
    pub http: ClientConfig,
    pub websocket: Arc<ClientConfig>,
    pub session_cache: Option<Arc<SharedSessionCache>>,
    settings: TlsConfig,
}

impl TlsProfiles {
    pub fn from_config(settings: &TlsConfig) -> Result<Self> {
        let session_cache = (settings.shared_session_cache && !settings.new_session_per_connection)
            .then(|| Arc::new(SharedSessionCache::new(SESSION_CACHE_SIZE)));

        let versions = protocol_versions(settings)?;
        let http = client_config(settings, &versions, session_cache.as_ref())?;
        let mut websocket = client_config(settings, &versions, session_cache.as_ref())?;
        websocket.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            http,
            websocket: Arc::new(websocket),
            session_cache,
            settings: settings.clone(),
        })
    }

    /// QUIC mandates TLS 1.3 whatever the configured range says.
    pub fn quic(&self) -> Result<ClientConfig> {
        let mut config = client_config(
            &self.settings,
            &[&rustls::version::TLS13],
            self.session_cache.as_ref(),
        )?;
        config.alpn_protocols = vec![b"h3".to_vec()];
        Ok(config)
    }
}

/// Maps the configured range onto what rustls can negotiate.
pub fn protocol_versions(settings: &TlsConfig) -> Result<Vec<&'static SupportedProtocolVersion>> {
    let range = settings.min_version..=settings.max_version;
    if settings.min_version < TlsVersion::Tls12 && range.contains(&TlsVersion::Tls12) {
        warn!(
            "TLS {:?} requested as minimum; only TLS 1.2 and 1.3 are available",
            settings.min_version
        );
    }

    let mut versions = Vec::with_capacity(2);
    if range.contains(&TlsVersion::Tls12) {
        versions.push(&rustls::version::TLS12);
    }
    if range.contains(&TlsVersion::Tls13) {
        versions.push(&rustls::version::TLS13);
    }
    if versions.is_empty() {
        return Err(Error::Config(format!(
            "TLS range {:?}..={:?} has no version supported by the TLS stack",
            settings.min_version, settings.max_version
        )));
    }
    Ok(versions)
}

fn client_config(
    settings: &TlsConfig,
    versions: &[&'static SupportedProtocolVersion],
    session_cache: Option<&Arc<SharedSessionCache>>,
) -> Result<ClientConfig> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(versions)?;

    let mut config = if settings.ignore_errors {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(&provider)))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    config.resumption = if settings.new_session_per_connection {
        Resumption::disabled()
    } else if let Some(cache) = session_cache {
        Resumption::store(cache.clone())
    } else {
        Resumption::default()
    };
    Ok(config)
}

/// Skips chain and name validation but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(min: TlsVersion, max: TlsVersion) -> TlsConfig {
        TlsConfig {
            min_version: min,
            max_version: max,
            ..TlsConfig::default()
        }
    }

    #[test]
    fn test_versions_clamped_to_supported() {
        let all = protocol_versions(&settings(TlsVersion::Tls10, TlsVersion::Tls13)).unwrap();
        assert_eq!(all.len(), 2);

        let only13 = protocol_versions(&settings(TlsVersion::Tls13, TlsVersion::Tls13)).unwrap();
        assert_eq!(only13.len(), 1);
        assert_eq!(only13[0].version, rustls::ProtocolVersion::TLSv1_3);
    }

    #[test]
    fn test_legacy_only_range_is_rejected() {
        let err = protocol_versions(&settings(TlsVersion::Tls10, TlsVersion::Tls11));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_profiles_share_one_cache() {
        let mut tls = TlsConfig::default();
        tls.shared_session_cache = true;
        let profiles = TlsProfiles::from_config(&tls).unwrap();
        assert!(profiles.session_cache.is_some());
        assert!(profiles.http.alpn_protocols.is_empty());
        assert_eq!(profiles.websocket.alpn_protocols, vec![b"http/1.1".to_vec()]);
        assert_eq!(profiles.quic().unwrap().alpn_protocols, vec![b"h3".to_vec()]);
    }

    #[test]
    fn test_new_session_per_connection_disables_cache() {
        let mut tls = TlsConfig::default();
        tls.shared_session_cache = true;
        tls.new_session_per_connection = true;
        let profiles = TlsProfiles::from_config(&tls).unwrap();
        assert!(profiles.session_cache.is_none());
    }

    #[test]
    fn test_session_cache_counts_misses() {
        let cache = SharedSessionCache::new(8);
        let name = ServerName::try_from("example.com".to_string()).unwrap();
        assert!(cache.tls12_session(&name).is_none());
        assert!(cache.take_tls13_ticket(&name).is_none());
        assert!(cache.kx_hint(&name).is_none());

        assert_eq!(cache.hits(), 0);
        assert_eq!(cache.misses(), 2);
        assert_eq!(cache.hit_rate(), 0.0);
    }
}
