use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::error::{Error, Result};

const SAMPLE: &str = "\
# One target URL per line. Blank lines and lines starting with # are ignored.
# Only absolute http:// and https:// URLs are accepted.
http://localhost:8080/
# https://example.com/
# https://api.example.com/v1/status
";

/// The endpoints a run draws from. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct TargetList {
    urls: Arc<[Url]>,
    skipped: usize,
}

impl TargetList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let list = Self::parse(&content);
        if list.urls.is_empty() {
            return Err(Error::NoTargets(path.to_path_buf()));
        }
        info!(
            "loaded {} targets from {} ({} skipped)",
            list.urls.len(),
            path.display(),
            list.skipped
        );
        Ok(list)
    }

    /// Parses the file contents. Bad lines are logged and counted, never fatal.
    pub fn parse(content: &str) -> Self {
        let mut urls = Vec::new();
        let mut skipped = 0;

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_target(line) {
                Some(url) => urls.push(url),
                None => {
                    warn!(line = index + 1, "skipping invalid target URL: {}", line);
                    skipped += 1;
                }
            }
        }

        Self {
            urls: urls.into(),
            skipped,
        }
    }

    pub fn urls(&self) -> Arc<[Url]> {
        self.urls.clone()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

fn parse_target(line: &str) -> Option<Url> {
    let url = Url::parse(line).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    (web && url.host_str().is_some_and(|h| !h.is_empty())).then_some(url)
}

/// Writes a commented starter file for the user to edit.
pub fn write_sample(path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, SAMPLE)?;
    Ok(())
}
