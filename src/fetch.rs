//! Loading map data: datasets, precomputed breaks and the runtime config.
//!
//! The map front ends read static JSON files relative to the site root. A
//! [`DataClient`] does the same against either a base URL or a local directory, so
//! the CLI works on a checked-out data repository as well as on the published site.
//!
//! ```no_run
//! # use ccm_style::DataClient;
//! let client = DataClient::http("https://example.org/maps");
//! let breaks = client.fetch_breaks("data/config/ccm_state_breaks.json")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::breaks::BreaksTable;
use crate::config::RuntimeConfig;
use crate::models::Dataset;
use anyhow::{Context, Result, bail};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::Client as HttpClient;
use reqwest::redirect::Policy;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where relative data paths are resolved.
#[derive(Debug, Clone)]
pub enum DataSource {
    Http { base_url: String, http: HttpClient },
    Dir(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DataClient {
    source: DataSource,
}

// Keep path-ish characters readable in URLs
const SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode each `/`-separated segment of a relative path.
pub fn encode_path(path: &str) -> String {
    path.trim_start_matches("./")
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| percent_encoding::utf8_percent_encode(s, SAFE).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn http_client() -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(Duration::from_secs(30)) // total request timeout
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(5))
        .user_agent(concat!("ccm-style/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")
}

impl DataClient {
    /// Client for data served under `base_url`.
    ///
    /// Panics only if the TLS backend cannot be initialized; use [`DataClient::try_http`]
    /// to handle that case.
    pub fn http(base_url: impl Into<String>) -> Self {
        Self::try_http(base_url).expect("reqwest client build")
    }

    pub fn try_http(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            source: DataSource::Http {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                http: http_client()?,
            },
        })
    }

    /// Client for data files below a local directory.
    pub fn dir(root: impl Into<PathBuf>) -> Self {
        Self {
            source: DataSource::Dir(root.into()),
        }
    }

    /// `http(s)://` locations become HTTP clients, anything else a directory.
    pub fn from_location(location: &str) -> Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::try_http(location)
        } else {
            Ok(Self::dir(location))
        }
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Where `path` resolves to, for messages.
    pub fn locate(&self, path: &str) -> String {
        match &self.source {
            DataSource::Http { base_url, .. } => format!("{}/{}", base_url, encode_path(path)),
            DataSource::Dir(root) => root.join(path.trim_start_matches("./")).display().to_string(),
        }
    }

    /// Read and decode one JSON document.
    pub fn get_json(&self, path: &str) -> Result<Value> {
        match &self.source {
            DataSource::Http { http, .. } => {
                let url = self.locate(path);
                get_with_retry(http, &url).with_context(|| format!("GET {}", url))
            }
            DataSource::Dir(root) => read_json_file(&root.join(path.trim_start_matches("./"))),
        }
    }

    pub fn fetch_dataset(&self, path: &str) -> Result<Dataset> {
        let v = self.get_json(path)?;
        let ds = Dataset::from_json_value(v).with_context(|| format!("dataset {}", path))?;
        log::info!("fetched {} features from {}", ds.len(), path);
        Ok(ds)
    }

    pub fn fetch_breaks(&self, path: &str) -> Result<BreaksTable> {
        let v = self.get_json(path)?;
        let table = BreaksTable::from_json_value(&v);
        if table.is_empty() {
            bail!("no break arrays found in {}", path);
        }
        log::debug!("fetched {} break entries from {}", table.len(), path);
        Ok(table)
    }

    pub fn fetch_runtime_config(&self, path: &str) -> Result<RuntimeConfig> {
        let v = self.get_json(path)?;
        serde_json::from_value(v).with_context(|| format!("parse runtime config {}", path))
    }
}

fn read_json_file(path: &Path) -> Result<Value> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("decode json {}", path.display()))
}

/// Pauses before each retry of a transient failure (5xx / network errors).
const BACKOFF_MS: [u64; 3] = [100, 300, 700];

fn get_with_retry(http: &HttpClient, url: &str) -> Result<Value> {
    let attempts = BACKOFF_MS.len() + 1;
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            std::thread::sleep(Duration::from_millis(BACKOFF_MS[attempt - 1]));
        }
        match http.get(url).send() {
            Ok(r) if r.status().is_success() => {
                return r.json().context("decode json");
            }
            Ok(r) if r.status().is_server_error() => {
                log::warn!("{} returned HTTP {}; retrying", url, r.status());
                last_err = Some(anyhow::anyhow!("HTTP {}", r.status()));
            }
            Ok(r) => bail!("request failed with HTTP {}", r.status()),
            Err(e) => last_err = Some(e.into()),
        }
    }
    let msg = format!("giving up after {} attempts", attempts);
    match last_err {
        Some(e) => Err(e.context(msg)),
        None => bail!("{}", msg),
    }
}
