use bytes::Bytes;
use http::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, REFERER, USER_AGENT,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use url::Url;

use crate::config::GenerationConfig;
use crate::context::SessionJar;
use crate::error::{Error, Result};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/125.0.0.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Android 14; Mobile; rv:126.0) Gecko/126.0 Firefox/126.0",
];

const METHODS: &[Method] = &[
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::HEAD,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];

const COMMON_PATHS: &[&str] = &[
    "api/v1/test",
    "api/v2/data",
    "user/profile",
    "admin/dashboard",
    "public/assets",
    "private/data",
    "test/endpoint",
    "health/check",
    "metrics/stats",
    "config/settings",
    "cache/clear",
    "auth/login",
];

const QUERY_PARAMS: &[(&str, &[&str])] = &[
    ("page", &["1", "2", "10", "100"]),
    ("limit", &["10", "50", "100", "500"]),
    ("sort", &["asc", "desc", "name", "date"]),
    ("filter", &["active", "all", "new", "old"]),
    ("format", &["json", "xml", "csv"]),
    ("version", &["v1", "v2", "latest"]),
];

const REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://github.com/",
    "https://stackoverflow.com/",
];

const PATH_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

const SEC_FETCH_MODE: HeaderName = HeaderName::from_static("sec-fetch-mode");
const SEC_FETCH_SITE: HeaderName = HeaderName::from_static("sec-fetch-site");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Browser user agent; the first entry when randomization is off.
pub fn user_agent(randomize: bool) -> &'static str {
    if randomize {
        USER_AGENTS.choose(&mut rand::rng()).copied().unwrap_or(USER_AGENTS[0])
    } else {
        USER_AGENTS[0]
    }
}

/// One pre-built request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: Url,
    pub payload: Bytes,
    pub headers: HeaderMap,
    pub method: Method,
}

/// Builds randomized [`RequestDescriptor`]s over a fixed target list.
#[derive(Debug)]
pub struct RequestGenerator {
    targets: Arc<[Url]>,
    generation: GenerationConfig,
    compression: bool,
    session: Arc<SessionJar>,
}

impl RequestGenerator {
    pub fn new(
        targets: Arc<[Url]>,
        generation: GenerationConfig,
        compression: bool,
        session: Arc<SessionJar>,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(Error::Config("request generator needs at least one target".into()));
        }
        Ok(Self {
            targets,
            generation,
            compression,
            session,
        })
    }

    pub fn generate(&self) -> RequestDescriptor {
        let mut rng = rand::rng();
        RequestDescriptor {
            url: self.url(&mut rng),
            payload: payload(&mut rng),
            headers: self.headers(&mut rng),
            method: self.method(&mut rng),
        }
    }

    fn url(&self, rng: &mut impl Rng) -> Url {
        let mut url = self.targets[rng.random_range(0..self.targets.len())].clone();

        if self.generation.random_path && rng.random_bool(0.7) {
            let path = format!("{}/{}", url.path().trim_end_matches('/'), random_path(rng));
            url.set_path(&path);
        }

        if self.generation.random_query && rng.random_bool(0.5) {
            let wanted = rng.random_range(1..=4);
            let mut used: Vec<&str> = Vec::with_capacity(wanted);
            for _ in 0..wanted {
                let (key, values) = QUERY_PARAMS[rng.random_range(0..QUERY_PARAMS.len())];
                if used.contains(&key) {
                    continue;
                }
                used.push(key);
                let value = values[rng.random_range(0..values.len())];
                url.query_pairs_mut().append_pair(key, value);
            }
        }
        url
    }

    fn headers(&self, rng: &mut impl Rng) -> HeaderMap {
        let ua = HeaderValue::from_static(user_agent(self.generation.random_user_agent));

        if self.generation.fixed_headers {
            let mut headers = self.session.fixed_headers().unwrap_or_default();
            headers.entry(USER_AGENT).or_insert(ua);
            return headers;
        }

        let mut headers = HeaderMap::with_capacity(10);
        headers.insert(USER_AGENT, ua);
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9,zh-CN;q=0.8"),
        );
        if self.compression {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br, zstd"));
        }
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        if rng.random_bool(0.4) {
            headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("cors"));
            headers.insert(SEC_FETCH_SITE, HeaderValue::from_static("cross-site"));
        }
        if rng.random_bool(0.3) {
            let referer = REFERERS[rng.random_range(0..REFERERS.len())];
            headers.insert(REFERER, HeaderValue::from_static(referer));
        }
        if rng.random_bool(0.2) {
            if let Ok(ip) = HeaderValue::from_str(&random_ip(rng)) {
                headers.insert(X_FORWARDED_FOR, ip);
            }
        }
        headers
    }

    fn method(&self, rng: &mut impl Rng) -> Method {
        if self.generation.random_method {
            METHODS[rng.random_range(0..METHODS.len())].clone()
        } else {
            Method::GET
        }
    }
}

fn random_path(rng: &mut impl Rng) -> String {
    if rng.random_bool(0.6) {
        return COMMON_PATHS[rng.random_range(0..COMMON_PATHS.len())].to_owned();
    }
    let levels = rng.random_range(1..=3);
    (0..levels)
        .map(|_| {
            let len = rng.random_range(3..=10);
            (0..len)
                .map(|_| PATH_CHARS[rng.random_range(0..PATH_CHARS.len())] as char)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn random_ip(rng: &mut impl Rng) -> String {
    format!(
        "{}.{}.{}.{}",
        rng.random_range(1..255u16),
        rng.random_range(0..256u16),
        rng.random_range(0..256u16),
        rng.random_range(1..255u16)
    )
}

fn payload(rng: &mut impl Rng) -> Bytes {
    match rng.random_range(0..5) {
        0 => {
            let doc = serde_json::json!({
                "id": rng.random::<i64>(),
                "timestamp": chrono::Utc::now().timestamp(),
                "type": "load_test",
                "data": format!("test_{}", rng.random_range(0..10_000)),
            });
            Bytes::from(doc.to_string())
        }
        1 => {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            for i in 0..rng.random_range(1..=5) {
                form.append_pair(&format!("field_{i}"), &format!("value_{}", rng.random::<i64>()));
            }
            Bytes::from(form.finish())
        }
        2 => Bytes::from(format!(
            r#"<?xml version="1.0"?><test><id>{}</id><data>test_{}</data></test>"#,
            rng.random::<i64>(),
            rng.random_range(0..10_000)
        )),
        3 => {
            let mut data = vec![0u8; rng.random_range(64..576)];
            rng.fill(&mut data[..]);
            Bytes::from(data)
        }
        _ => {
            let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
            Bytes::from(format!("test_payload_{}_{}", nanos, rng.random::<i64>()))
        }
    }
}
