//! Document loader
//!
//! Resolves a URL into an opened [`DocumentHandle`] by trying a fixed list of
//! strategies in order. A failing strategy never aborts the sequence; only
//! when every strategy has failed is the last failure classified and
//! returned.

pub mod fetch;
pub mod strategy;

use std::time::Duration;

use serde::Serialize;
use url::Url;

use self::fetch::Fetcher;
use self::strategy::{
    DirectFetch, LoadEnv, ProxyFetch, RawByteFetch, RelayFetch, Strategy, StrategyKind,
};
use super::document::{Decoder, DocumentHandle};

/// Why a single strategy failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum FailureCause {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("cross-origin request blocked: {0}")]
    CrossOrigin(String),

    #[error("server responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("response is not a PDF document: {0}")]
    NotADocument(String),

    #[error("document could not be parsed: {0}")]
    Decode(String),

    /// The strategy cannot run with the current configuration
    #[error("strategy unavailable: {0}")]
    Unavailable(String),
}

impl FailureCause {
    /// Failures that look like the browser refusing or losing the request
    #[must_use]
    pub fn is_network_signature(&self) -> bool {
        matches!(
            self,
            FailureCause::Network(_) | FailureCause::Timeout | FailureCause::CrossOrigin(_)
        )
    }
}

/// A single strategy failed; recorded and followed by the next strategy
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{strategy} strategy failed: {cause}")]
pub struct StrategyFailure {
    pub strategy: StrategyKind,
    pub cause: FailureCause,
}

/// Result of one strategy execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Opened { page_count: usize },
    Failed(FailureCause),
}

/// Transient record of one strategy execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadAttempt {
    pub strategy: StrategyKind,
    pub outcome: AttemptOutcome,
}

/// Document-level load failure
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DocumentLoadError {
    #[error("Invalid document source: {0}")]
    InvalidSource(String),

    #[error(
        "This document is blocked by cross-origin restrictions. \
         Please contact the administrator to enable access."
    )]
    CrossOriginBlocked { url: String, last: StrategyFailure },

    #[error("Failed to load document: {}", .last.cause)]
    LoadFailed { url: String, last: StrategyFailure },
}

impl DocumentLoadError {
    /// Classify an exhausted strategy list by its terminal failure
    ///
    /// Strategies that could not run are ignored when picking the terminal
    /// failure.
    #[must_use]
    pub fn from_exhausted(url: &Url, attempts: &[LoadAttempt]) -> Self {
        let failures = || {
            attempts.iter().filter_map(|a| match &a.outcome {
                AttemptOutcome::Failed(cause) => Some(StrategyFailure {
                    strategy: a.strategy,
                    cause: cause.clone(),
                }),
                AttemptOutcome::Opened { .. } => None,
            })
        };

        let terminal = failures()
            .filter(|f| !matches!(f.cause, FailureCause::Unavailable(_)))
            .last()
            .or_else(|| failures().last());

        let Some(last) = terminal else {
            return DocumentLoadError::InvalidSource("no loading strategy configured".into());
        };

        if last.cause.is_network_signature() {
            DocumentLoadError::CrossOriginBlocked {
                url: url.to_string(),
                last,
            }
        } else {
            DocumentLoadError::LoadFailed {
                url: url.to_string(),
                last,
            }
        }
    }
}

/// Explicit loader configuration
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderConfig {
    /// Page origin, used for relative URLs, the proxy, and cross-origin checks
    pub base_url: Option<Url>,
    pub proxy_endpoint: String,
    /// `None` disables the public relay
    pub relay_proxy: Option<String>,
    pub raw_fetch_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            proxy_endpoint: "/api/proxy-pdf".to_string(),
            relay_proxy: Some("https://api.allorigins.win/raw?url=".to_string()),
            raw_fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Ordered strategy driver
pub struct DocumentLoader {
    base_url: Option<Url>,
    strategies: Vec<Box<dyn Strategy>>,
    fetcher: Box<dyn Fetcher>,
    decoder: Box<dyn Decoder>,
}

impl DocumentLoader {
    /// Loader with the standard four strategies
    #[must_use]
    pub fn new(config: LoaderConfig, fetcher: Box<dyn Fetcher>, decoder: Box<dyn Decoder>) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(DirectFetch::new(config.base_url.clone())),
            Box::new(ProxyFetch::new(
                config.base_url.as_ref(),
                &config.proxy_endpoint,
            )),
            Box::new(RawByteFetch::new(config.raw_fetch_timeout)),
            Box::new(RelayFetch::new(config.relay_proxy.clone())),
        ];
        Self::with_strategies(config.base_url, strategies, fetcher, decoder)
    }

    #[must_use]
    pub fn with_strategies(
        base_url: Option<Url>,
        strategies: Vec<Box<dyn Strategy>>,
        fetcher: Box<dyn Fetcher>,
        decoder: Box<dyn Decoder>,
    ) -> Self {
        Self {
            base_url,
            strategies,
            fetcher,
            decoder,
        }
    }

    #[must_use]
    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Turn a possibly missing, possibly relative URL into an absolute one
    pub fn resolve(&self, url: Option<&str>) -> Result<Url, DocumentLoadError> {
        let raw = url.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(DocumentLoadError::InvalidSource(
                "no document URL provided".into(),
            ));
        }

        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    DocumentLoadError::InvalidSource(format!(
                        "relative URL {raw:?} with no page origin configured"
                    ))
                })?;
                base.join(raw)
                    .map_err(|e| DocumentLoadError::InvalidSource(format!("{raw:?}: {e}")))
            }
            Err(e) => Err(DocumentLoadError::InvalidSource(format!("{raw:?}: {e}"))),
        }
    }

    /// Load a document from `url`
    pub fn load(&self, url: &str) -> Result<DocumentHandle, DocumentLoadError> {
        self.load_source(Some(url))
    }

    /// Load a document from an optional URL; a missing URL fails immediately
    pub fn load_source(&self, url: Option<&str>) -> Result<DocumentHandle, DocumentLoadError> {
        let url = self.resolve(url)?;
        let env = LoadEnv {
            fetcher: self.fetcher.as_ref(),
            decoder: self.decoder.as_ref(),
        };

        let mut attempts = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let kind = strategy.kind();
            match strategy.attempt(&url, &env) {
                Ok(handle) => {
                    attempts.push(LoadAttempt {
                        strategy: kind,
                        outcome: AttemptOutcome::Opened {
                            page_count: handle.page_count(),
                        },
                    });
                    log::debug!("opened {url} after {} attempt(s): {attempts:?}", attempts.len());
                    return Ok(handle);
                }
                Err(cause) => {
                    log::debug!("{kind} strategy failed for {url}: {cause}");
                    attempts.push(LoadAttempt {
                        strategy: kind,
                        outcome: AttemptOutcome::Failed(cause),
                    });
                }
            }
        }

        let error = DocumentLoadError::from_exhausted(&url, &attempts);
        log::warn!("all loading strategies failed for {url}: {error}");
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeDecoder, ScriptedFetcher};

    fn loader(config: LoaderConfig, fetcher: ScriptedFetcher) -> DocumentLoader {
        DocumentLoader::new(config, Box::new(fetcher), Box::new(FakeDecoder::default()))
    }

    fn origin_config() -> LoaderConfig {
        LoaderConfig {
            base_url: Some(Url::parse("https://courses.example/").unwrap()),
            relay_proxy: Some("https://relay.example/raw?url=".into()),
            ..LoaderConfig::default()
        }
    }

    #[test]
    fn test_empty_url_fails_without_network() {
        let fetcher = ScriptedFetcher::default();
        let calls = fetcher.calls();
        let loader = loader(origin_config(), fetcher);

        for source in [Some(""), Some("   "), None] {
            assert!(matches!(
                loader.load_source(source),
                Err(DocumentLoadError::InvalidSource(_))
            ));
        }
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_direct_success_returns_handle() {
        let fetcher =
            ScriptedFetcher::default().respond_pdf("https://courses.example/doc.pdf", 3);
        let loader = loader(origin_config(), fetcher);

        let handle = loader.load("https://courses.example/doc.pdf").unwrap();
        assert_eq!(handle.page_count(), 3);
    }

    #[test]
    fn test_relative_url_resolves_against_origin() {
        let fetcher =
            ScriptedFetcher::default().respond_pdf("https://courses.example/files/doc.pdf", 2);
        let loader = loader(origin_config(), fetcher);

        let handle = loader.load("/files/doc.pdf").unwrap();
        assert_eq!(handle.origin(), "https://courses.example/files/doc.pdf");
    }

    #[test]
    fn test_relative_url_without_origin_is_invalid() {
        let loader = loader(LoaderConfig::default(), ScriptedFetcher::default());
        assert!(matches!(
            loader.load("files/doc.pdf"),
            Err(DocumentLoadError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_falls_through_to_raw_bytes() {
        let target = "https://cdn.example/doc.pdf";
        let fetcher = ScriptedFetcher::default()
            .fail_nth(target, 0, FailureCause::Network("connection reset".into()))
            .fail_prefix(
                "https://courses.example/api/proxy-pdf",
                FailureCause::HttpStatus(502),
            )
            .respond_pdf(target, 4);
        let calls = fetcher.calls();
        let loader = loader(origin_config(), fetcher);

        let handle = loader.load(target).unwrap();
        assert_eq!(handle.page_count(), 4);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls[2].timeout.is_some());
    }

    #[test]
    fn test_all_network_failures_classify_as_cross_origin() {
        let fetcher =
            ScriptedFetcher::default().fail_all(FailureCause::Network("Failed to fetch".into()));
        let loader = loader(origin_config(), fetcher);

        let err = loader.load("https://cdn.example/doc.pdf").unwrap_err();
        assert!(matches!(err, DocumentLoadError::CrossOriginBlocked { .. }));
        assert!(err.to_string().contains("contact the administrator"));
    }

    #[test]
    fn test_terminal_parse_failure_is_load_failed() {
        let fetcher = ScriptedFetcher::default()
            .fail_all(FailureCause::Network("Failed to fetch".into()))
            .respond_bytes("https://relay.example/raw", b"%PDF-garbage".to_vec());
        let loader = loader(origin_config(), fetcher);

        let err = loader.load("https://cdn.example/doc.pdf").unwrap_err();
        match err {
            DocumentLoadError::LoadFailed { last, .. } => {
                assert_eq!(last.strategy, StrategyKind::PublicRelay);
                assert!(matches!(last.cause, FailureCause::Decode(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_disabled_relay_does_not_mask_network_signature() {
        let fetcher = ScriptedFetcher::default().fail_all(FailureCause::Timeout);
        let config = LoaderConfig {
            relay_proxy: None,
            ..origin_config()
        };
        let loader = loader(config, fetcher);

        assert!(matches!(
            loader.load("https://cdn.example/doc.pdf"),
            Err(DocumentLoadError::CrossOriginBlocked { .. })
        ));
    }

    #[test]
    fn test_cross_origin_direct_fetch_requires_allow_origin() {
        let target = "https://cdn.example/doc.pdf";
        let fetcher = ScriptedFetcher::default()
            .respond_pdf_without_cors(target, 2)
            .fail_prefix(
                "https://courses.example/api/proxy-pdf",
                FailureCause::HttpStatus(404),
            );
        let calls = fetcher.calls();
        let loader = loader(origin_config(), fetcher);

        // Direct fails on CORS, proxy 404s, raw bytes succeeds
        let handle = loader.load(target).unwrap();
        assert_eq!(handle.page_count(), 2);

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].origin.as_deref(), Some("https://courses.example"));
        assert_eq!(calls.len(), 3);
    }

    #[test]
    fn test_strategy_order_is_fixed() {
        let loader = loader(origin_config(), ScriptedFetcher::default());
        assert_eq!(
            loader.strategy_kinds(),
            vec![
                StrategyKind::Direct,
                StrategyKind::SameOriginProxy,
                StrategyKind::RawBytes,
                StrategyKind::PublicRelay,
            ]
        );
    }
}
