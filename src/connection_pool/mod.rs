use bytes::Bytes;
use dashmap::DashMap;
use socket2::TcpKeepalive;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

pub type Http3Sender = h3::client::SendRequest<h3_quinn::OpenStreams, Bytes>;

/// Live HTTP/3 connections, one per `host:port`.
///
/// Each entry carries a generation number so a connection that closes only
/// evicts itself, never a newer connection that replaced it.
#[derive(Clone, Default)]
pub struct Http3ConnectionPool {
    connections: Arc<DashMap<String, (u64, Http3Sender)>>,
    generation: Arc<AtomicU64>,
}

impl Http3ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, authority: &str) -> Option<Http3Sender> {
        let entry = self.connections.get(authority)?;
        debug!("Reusing HTTP/3 connection to {}", authority);
        Some(entry.1.clone())
    }

    /// Stores `sender` for `authority` and returns its generation.
    pub fn insert(&self, authority: &str, sender: Http3Sender) -> u64 {
        let id = self.generation.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(authority.to_owned(), (id, sender));
        debug!(
            "Pooled HTTP/3 connection to {} (pool size: {})",
            authority,
            self.connections.len()
        );
        id
    }

    pub fn evict(&self, authority: &str, id: u64) {
        if self
            .connections
            .remove_if(authority, |_, (current, _)| *current == id)
            .is_some()
        {
            debug!("Evicted closed HTTP/3 connection to {}", authority);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// TCP keepalive probes and no Nagle for long-lived client sockets.
pub fn configure_keepalive(stream: &TcpStream, idle: Duration) -> io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(idle)
        .with_interval(Duration::from_secs(10));
    sock_ref.set_tcp_keepalive(&keepalive)?;

    stream.set_nodelay(true)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_keepalive_applies_to_connected_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, _server) =
            tokio::join!(TcpStream::connect(addr), listener.accept());
        let client = client.unwrap();

        configure_keepalive(&client, Duration::from_secs(30)).unwrap();
        assert!(client.nodelay().unwrap());
    }

    #[test]
    fn test_empty_pool() {
        let pool = Http3ConnectionPool::new();
        assert!(pool.is_empty());
        assert!(pool.get("example.com:443").is_none());
        pool.evict("example.com:443", 0);
        assert_eq!(pool.len(), 0);
    }
}
