use http::header::{ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, SET_COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Request};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::generator::user_agent;
use crate::config::Config;
use crate::executor::{RoundTrip, empty_body};

/// Headers and cookies that make the whole run look like one browser session.
///
/// Only used when fixed headers are enabled; otherwise every request carries
/// its own randomized header set and cookies are ignored.
#[derive(Debug, Default)]
pub struct SessionJar {
    tracking: bool,
    fixed_headers: RwLock<Option<HeaderMap>>,
    cookies: RwLock<BTreeMap<String, String>>,
}

impl SessionJar {
    pub fn new(tracking: bool) -> Self {
        Self {
            tracking,
            ..Self::default()
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn fixed_headers(&self) -> Option<HeaderMap> {
        self.fixed_headers.read().clone()
    }

    pub fn set_fixed_headers(&self, headers: HeaderMap) {
        *self.fixed_headers.write() = Some(headers);
    }

    /// Stores every `Set-Cookie` name/value pair. Returns whether any header
    /// was present.
    pub fn harvest(&self, headers: &HeaderMap) -> bool {
        let mut found = false;
        for value in headers.get_all(SET_COOKIE) {
            let Some((name, value)) = value.to_str().ok().and_then(parse_set_cookie) else {
                continue;
            };
            found = true;
            self.cookies.write().insert(name.to_owned(), value.to_owned());
        }
        if found {
            debug!(cookies = self.cookie_count(), "session cookies updated");
        }
        found
    }

    /// `Cookie` header for the current jar, if tracking and non-empty.
    pub fn cookie_header(&self) -> Option<HeaderValue> {
        if !self.tracking {
            return None;
        }
        let cookies = self.cookies.read();
        if cookies.is_empty() {
            return None;
        }
        let joined = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }

    pub fn cookie_count(&self) -> usize {
        self.cookies.read().len()
    }

    /// Visits `target` once with a browser-like header set, keeps that set as
    /// the fixed headers and collects the cookies it hands out.
    pub async fn prime<T: RoundTrip>(&self, transport: &T, target: &Url, config: &Config) {
        if !self.tracking {
            return;
        }

        let mut headers = HeaderMap::new();
        let ua = user_agent(config.generation.random_user_agent);
        headers.insert(USER_AGENT, HeaderValue::from_static(ua));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        if config.http.compression {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        }
        self.set_fixed_headers(headers.clone());

        let mut builder = Request::builder().method(Method::GET).uri(target.as_str());
        if let Some(h) = builder.headers_mut() {
            h.extend(headers);
        }
        let request = match builder.body(empty_body()) {
            Ok(request) => request,
            Err(e) => {
                warn!("could not build session priming request: {}", e);
                return;
            }
        };

        match timeout(config.http.request_timeout(), transport.round_trip(request)).await {
            Ok(Ok(exchange)) => {
                self.harvest(&exchange.headers);
                info!(
                    status = exchange.status.as_u16(),
                    cookies = self.cookie_count(),
                    "session primed against {}",
                    target
                );
            }
            Ok(Err(e)) => warn!("session priming request failed: {}", e),
            Err(_) => warn!("session priming request timed out"),
        }
    }
}

fn parse_set_cookie(raw: &str) -> Option<(&str, &str)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then(|| (name, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_cookies(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for v in values {
            headers.append(SET_COOKIE, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn test_harvest_and_cookie_header() {
        let jar = SessionJar::new(true);
        let found = jar.harvest(&set_cookies(&[
            "sid=abc123; Path=/; HttpOnly",
            "theme=dark",
        ]));
        assert!(found);
        assert_eq!(jar.cookie_count(), 2);
        assert_eq!(
            jar.cookie_header().unwrap().to_str().unwrap(),
            "sid=abc123; theme=dark"
        );
    }

    #[test]
    fn test_later_cookie_overwrites() {
        let jar = SessionJar::new(true);
        jar.harvest(&set_cookies(&["sid=one"]));
        jar.harvest(&set_cookies(&["sid=two"]));
        assert_eq!(jar.cookie_header().unwrap(), "sid=two");
    }

    #[test]
    fn test_no_set_cookie_reports_nothing() {
        let jar = SessionJar::new(true);
        assert!(!jar.harvest(&HeaderMap::new()));
        assert!(!jar.harvest(&set_cookies(&["garbage-without-equals"])));
        assert!(jar.cookie_header().is_none());
    }

    #[test]
    fn test_untracked_jar_emits_no_cookie() {
        let jar = SessionJar::new(false);
        jar.harvest(&set_cookies(&["sid=abc"]));
        assert!(jar.cookie_header().is_none());
    }
}
