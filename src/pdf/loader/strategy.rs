//! The fixed, ordered list of ways a document can be fetched

use std::time::Duration;

use serde::Serialize;
use url::Url;

use super::FailureCause;
use super::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::pdf::document::{Decoder, DocumentHandle};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Identifies a loading strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Fetch the URL itself
    Direct,
    /// Fetch through the backend's same-origin proxy endpoint
    SameOriginProxy,
    /// Manual byte fetch with a timeout, parsed from memory
    RawBytes,
    /// Public CORS relay, last resort
    PublicRelay,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::SameOriginProxy => "same-origin proxy",
            StrategyKind::RawBytes => "raw bytes",
            StrategyKind::PublicRelay => "public relay",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a strategy may use while attempting a load
pub struct LoadEnv<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub decoder: &'a dyn Decoder,
}

impl LoadEnv<'_> {
    fn open(&self, response: FetchResponse, url: &Url) -> Result<DocumentHandle, FailureCause> {
        if !response.is_success() {
            return Err(FailureCause::HttpStatus(response.status));
        }
        let source = self
            .decoder
            .open(response.body)
            .map_err(|e| FailureCause::Decode(e.detail))?;
        Ok(DocumentHandle::new(source, url.as_str()))
    }
}

/// One way of turning a URL into an opened document
pub trait Strategy: Send {
    fn kind(&self) -> StrategyKind;

    fn attempt(&self, url: &Url, env: &LoadEnv<'_>) -> Result<DocumentHandle, FailureCause>;
}

/// Strategy 1: fetch the document directly, honouring cross-origin rules
/// when the page origin is known
pub struct DirectFetch {
    page_origin: Option<Url>,
}

impl DirectFetch {
    #[must_use]
    pub fn new(page_origin: Option<Url>) -> Self {
        Self { page_origin }
    }

    fn check_cors(origin: &str, response: &FetchResponse) -> Result<(), FailureCause> {
        match response.header("access-control-allow-origin") {
            Some("*") => Ok(()),
            Some(allowed) if allowed.trim_end_matches('/') == origin => Ok(()),
            Some(other) => Err(FailureCause::CrossOrigin(format!(
                "origin {origin} not allowed (server allows {other})"
            ))),
            None => Err(FailureCause::CrossOrigin(format!(
                "no Access-Control-Allow-Origin header for {origin}"
            ))),
        }
    }
}

impl Strategy for DirectFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn attempt(&self, url: &Url, env: &LoadEnv<'_>) -> Result<DocumentHandle, FailureCause> {
        let cross_origin = self
            .page_origin
            .as_ref()
            .map(|page| page.origin())
            .filter(|page| *page != url.origin());

        let mut request = FetchRequest::get(url.clone());
        if let Some(origin) = &cross_origin {
            request = request.with_origin(origin.ascii_serialization());
        }

        let response = env.fetcher.fetch(&request)?;
        if let Some(origin) = cross_origin {
            Self::check_cors(&origin.ascii_serialization(), &response)?;
        }
        env.open(response, url)
    }
}

/// Strategy 2: `GET <endpoint>?url=<encoded>` on the page's own origin
pub struct ProxyFetch {
    endpoint: Option<Url>,
}

impl ProxyFetch {
    /// `endpoint` is resolved against the page origin; without an origin the
    /// strategy is unavailable
    #[must_use]
    pub fn new(page_origin: Option<&Url>, endpoint: &str) -> Self {
        let endpoint = page_origin.and_then(|base| base.join(endpoint).ok());
        Self { endpoint }
    }

    #[must_use]
    pub fn proxied_url(&self, target: &Url) -> Option<Url> {
        let mut proxied = self.endpoint.clone()?;
        proxied.query_pairs_mut().append_pair("url", target.as_str());
        Some(proxied)
    }
}

impl Strategy for ProxyFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SameOriginProxy
    }

    fn attempt(&self, url: &Url, env: &LoadEnv<'_>) -> Result<DocumentHandle, FailureCause> {
        let proxied = self
            .proxied_url(url)
            .ok_or_else(|| FailureCause::Unavailable("no page origin for the proxy".into()))?;
        let response = env.fetcher.fetch(&FetchRequest::get(proxied))?;
        env.open(response, url)
    }
}

/// Strategy 3: fetch raw bytes with a hard timeout and parse them from memory
pub struct RawByteFetch {
    timeout: Duration,
}

impl RawByteFetch {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn looks_like_pdf(body: &[u8]) -> bool {
        let start = body
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(body.len());
        body[start..].starts_with(PDF_MAGIC)
    }
}

impl Strategy for RawByteFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RawBytes
    }

    fn attempt(&self, url: &Url, env: &LoadEnv<'_>) -> Result<DocumentHandle, FailureCause> {
        let request = FetchRequest::get(url.clone()).with_timeout(self.timeout);
        let response = env.fetcher.fetch(&request)?;

        if !response.is_success() {
            return Err(FailureCause::HttpStatus(response.status));
        }
        if !Self::looks_like_pdf(&response.body) {
            let content_type = response.header("content-type").unwrap_or("unknown type");
            return Err(FailureCause::NotADocument(format!(
                "{} bytes of {content_type}",
                response.body.len()
            )));
        }
        env.open(response, url)
    }
}

/// Strategy 4: third-party CORS relay (`<prefix><encoded url>`)
pub struct RelayFetch {
    prefix: Option<String>,
}

impl RelayFetch {
    #[must_use]
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn relayed_url(&self, target: &Url) -> Option<Url> {
        let prefix = self.prefix.as_ref()?;
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
        Url::parse(&format!("{prefix}{encoded}")).ok()
    }
}

impl Strategy for RelayFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PublicRelay
    }

    fn attempt(&self, url: &Url, env: &LoadEnv<'_>) -> Result<DocumentHandle, FailureCause> {
        let relayed = self
            .relayed_url(url)
            .ok_or_else(|| FailureCause::Unavailable("public relay disabled".into()))?;
        log::info!("falling back to public relay for {url}");
        let response = env.fetcher.fetch(&FetchRequest::get(relayed))?;
        env.open(response, url)
    }
}
