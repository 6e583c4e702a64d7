//! HTTP access used by the loading strategies

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use super::FailureCause;

const USER_AGENT: &str = concat!("lectern/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single GET request
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub url: Url,
    /// Sent as the `Origin` header for cross-origin requests
    pub origin: Option<String>,
    /// Whole-request timeout; `None` leaves only the connect timeout
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            url,
            origin: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs GET requests on behalf of the loader
pub trait Fetcher: Send {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FailureCause>;
}

/// Blocking [`Fetcher`] backed by `reqwest`
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FailureCause> {
        let mut builder = self.client.get(request.url.clone());
        if let Some(origin) = &request.origin {
            builder = builder.header(reqwest::header::ORIGIN, origin);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let res = builder.send().map_err(classify)?;

        let url = res.url().to_string();
        let status = res.status().as_u16();
        let headers = res
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_ascii_lowercase(),
                    v.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();

        // No streaming: documents are parsed from memory
        let body = res.bytes().map_err(classify)?.to_vec();

        Ok(FetchResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> FailureCause {
    if err.is_timeout() {
        FailureCause::Timeout
    } else {
        FailureCause::Network(err.to_string())
    }
}
