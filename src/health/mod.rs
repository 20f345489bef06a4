use http::header::{ACCEPT, USER_AGENT};
use http::{Method, Request};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};
use url::Url;

use crate::cache::generator::user_agent;
use crate::executor::{HyperTransport, RoundTrip, empty_body};

/// Outcome of a pre-flight probe round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub checked: usize,
    pub reachable: usize,
}

impl HealthReport {
    pub fn any_reachable(&self) -> bool {
        self.reachable > 0
    }
}

/// Probes a handful of targets once before the run.
pub struct HealthChecker {
    transport: HyperTransport,
    check_timeout: Duration,
    max_targets: usize,
}

impl HealthChecker {
    pub fn new(transport: HyperTransport, check_timeout_seconds: u64, max_targets: usize) -> Self {
        Self {
            transport,
            check_timeout: Duration::from_secs(check_timeout_seconds),
            max_targets,
        }
    }

    pub async fn check(&self, targets: &[Url]) -> HealthReport {
        let mut check_tasks = Vec::new();

        for target in targets.iter().take(self.max_targets) {
            let target = target.clone();
            let transport = self.transport.clone();
            let timeout = self.check_timeout;

            check_tasks.push(tokio::spawn(async move {
                check_target(&transport, &target, timeout).await
            }));
        }

        let checked = check_tasks.len();
        let mut reachable = 0;
        for task in check_tasks {
            match task.await {
                Ok(true) => reachable += 1,
                Ok(false) => {}
                Err(e) => error!("Health check task failed: {}", e),
            }
        }

        info!("Health check: {}/{} targets reachable", reachable, checked);
        HealthReport { checked, reachable }
    }
}

async fn check_target<T: RoundTrip>(transport: &T, target: &Url, timeout: Duration) -> bool {
    debug!("Health checking {}", target);

    let request = Request::builder()
        .method(Method::GET)
        .uri(target.as_str())
        .header(USER_AGENT, user_agent(false))
        .header(ACCEPT, "*/*")
        .body(empty_body());
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            debug!("Health check request for {} not built: {}", target, e);
            return false;
        }
    };

    match time::timeout(timeout, transport.round_trip(request)).await {
        Ok(Ok(exchange)) => {
            let status = exchange.status.as_u16();
            debug!("Health check for {} answered {}", target, status);
            (200..500).contains(&status)
        }
        Ok(Err(e)) => {
            debug!("Health check FAILED for {}: {}", target, e);
            false
        }
        Err(_) => {
            debug!("Health check TIMEOUT for {}", target);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::tls::TlsProfiles;

    fn checker() -> HealthChecker {
        let tls = TlsProfiles::from_config(&Default::default()).unwrap();
        let transport = HyperTransport::new(&HttpConfig::default(), tls.http);
        HealthChecker::new(transport, 2, 5)
    }

    #[tokio::test]
    async fn test_unreachable_target() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let target = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let report = checker().check(&[target]).await;
        assert_eq!(report, HealthReport { checked: 1, reachable: 0 });
        assert!(!report.any_reachable());
    }

    #[tokio::test]
    async fn test_checks_at_most_max_targets() {
        let targets: Vec<Url> = (0..8)
            .map(|i| Url::parse(&format!("http://127.0.0.1:1/{i}")).unwrap())
            .collect();
        let report = checker().check(&targets).await;
        assert_eq!(report.checked, 5);
    }
}
