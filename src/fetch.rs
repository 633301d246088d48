//! Outbound HTTP.
//!
//! Everything the proxy fetches goes through the [`Fetcher`] trait so that
//! discovery and the handlers can be exercised without a network. The
//! production implementation, [`HttpFetcher`], wraps `reqwest` with a hard
//! per-request timeout and a streamed size ceiling.
//!
//! A fetcher does not apply the SSRF policy to the URL it is handed: callers
//! validate first. `HttpFetcher` does re-validate every redirect hop.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::util::UrlSafetyValidator;

/// `Accept` header sent when looking for feeds.
pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

/// `Accept` header sent when fetching pages.
pub const HTML_ACCEPT: &str = "text/html, application/xhtml+xml;q=0.9, */*;q=0.8";

const MAX_REDIRECTS: usize = 5;

/// Errors that can occur while fetching a remote resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, redirect policy, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The request did not complete within its timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size ceiling
    #[error("Response too large")]
    ResponseTooLarge,
    /// The resource could not be fetched for another reason
    #[error("Request failed: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// Largest body accepted, in bytes.
    pub max_bytes: usize,
}

impl FetchRequest {
    pub fn get(url: Url, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            url,
            method: Method::Get,
            headers: Vec::new(),
            timeout,
            max_bytes,
        }
    }

    pub fn head(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            method: Method::Head,
            headers: Vec::new(),
            timeout,
            max_bytes: 0,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A completed response. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of the named header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> String {
        self.header("content-type").unwrap_or("").to_lowercase()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Capability to fetch a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs `request`, honoring its timeout and size ceiling.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a client whose redirect policy re-applies `validator` to every
    /// hop, so a public URL cannot bounce the proxy into a private one.
    pub fn new(user_agent: &str, validator: UrlSafetyValidator) -> Result<Self, FetchError> {
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match validator.check(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(e) => {
                    tracing::warn!(target_url = %attempt.url(), error = %e, "Refusing redirect");
                    attempt.stop()
                }
            }
        });

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(policy)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client (its redirect policy is used as is).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let timeout = request.timeout;
        tokio::time::timeout(timeout, self.send(request))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

impl HttpFetcher {
    async fn send(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.as_str()),
            Method::Head => self.client.head(request.url.as_str()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_owned()))
            })
            .collect();

        let body = match request.method {
            Method::Head => Vec::new(),
            Method::Get => read_limited_bytes(response, request.max_bytes).await?,
        };

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

/// Reads a response body, failing as soon as it exceeds `limit` bytes.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
