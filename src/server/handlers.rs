use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{AppState, CAPABILITIES};
use crate::content::{extract_article, Article};
use crate::error::{ProxyError, RequestError};
use crate::fetch::{FetchRequest, FetchResponse, FEED_ACCEPT, HTML_ACCEPT};

/// Caller headers passed upstream by `/fetch` (conditional requests only).
pub const FORWARDED_REQUEST_HEADERS: &[&str] = &["if-none-match", "if-modified-since"];

/// Upstream headers returned by `/fetch`.
pub const RETURNED_RESPONSE_HEADERS: &[&str] = &[
    "content-type",
    "etag",
    "last-modified",
    "cache-control",
    "content-length",
];

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub url: String,
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FetchProxyRequest {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchProxyResponse {
    pub success: bool,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// `None` for `304 Not Modified`.
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseFormat {
    #[default]
    Html,
    Text,
    Both,
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub url: String,
    #[serde(default)]
    pub format: ParseFormat,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    pub success: bool,
    pub title: Option<String>,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    pub excerpt: Option<String>,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    pub image: Option<String>,
}

impl ParseResponse {
    fn new(article: Article, format: ParseFormat) -> Self {
        let with_html = matches!(format, ParseFormat::Html | ParseFormat::Both);
        let with_text = matches!(format, ParseFormat::Text | ParseFormat::Both);
        Self {
            success: true,
            title: article.title,
            byline: article.byline,
            site_name: article.site_name,
            excerpt: article.excerpt,
            length: article.length,
            html_content: with_html.then(|| article.html_content.clone()),
            content: with_html.then_some(article.html_content),
            text_content: with_text.then_some(article.text_content),
            image: article.image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
    pub provider: String,
    pub capabilities: Vec<&'static str>,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, RequestError> {
    serde_json::from_slice(body).map_err(|e| RequestError::MalformedBody(e.to_string()))
}

fn respond<T: Serialize>(endpoint: &'static str, result: Result<T, ProxyError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::info!(endpoint, code = e.kind().code(), error = %e, "Request failed");
            e.into_response()
        }
    }
}

pub(super) async fn discover(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: DiscoverRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    let result = state.discovery.discover(&request.url, request.timeout).await;
    respond("discover", result)
}

pub(super) async fn fetch(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: FetchProxyRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    respond("fetch", proxy_fetch(&state, request).await)
}

pub(super) async fn parse(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ParseRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    respond("parse", parse_article(&state, request).await)
}

pub(super) async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        provider: state.config.provider.clone(),
        capabilities: CAPABILITIES.to_vec(),
    })
}

/// Runs one upstream request under `timeout`, mapping failures with the
/// `limit` that applied.
async fn fetch_upstream(
    state: &AppState,
    request: FetchRequest,
    timeout: Duration,
    limit: usize,
) -> Result<FetchResponse, ProxyError> {
    tokio::time::timeout(timeout, state.fetcher.fetch(request))
        .await
        .map_err(|_| ProxyError::Timeout)?
        .map_err(|e| ProxyError::from_fetch(e, limit))
}

async fn proxy_fetch(
    state: &AppState,
    request: FetchProxyRequest,
) -> Result<FetchProxyResponse, ProxyError> {
    let url = state.validator.validate(&request.url)?;
    let limits = &state.config.limits;
    let timeout = limits.clamp_timeout(request.timeout, limits.default_timeout_ms);
    let limit = limits.max_feed_bytes;

    let mut upstream = FetchRequest::get(url.clone(), timeout, limit).header("Accept", FEED_ACCEPT);
    for (name, value) in request.headers {
        let name = name.to_ascii_lowercase();
        if FORWARDED_REQUEST_HEADERS.contains(&name.as_str()) {
            upstream = upstream.header(name, value);
        }
    }

    let response = fetch_upstream(state, upstream, timeout, limit).await?;
    let headers: BTreeMap<String, String> = RETURNED_RESPONSE_HEADERS
        .iter()
        .filter_map(|&name| {
            response
                .header(name)
                .map(|value| (name.to_owned(), value.to_owned()))
        })
        .collect();

    let body = match response.status {
        304 => None,
        status if (200..300).contains(&status) => Some(response.text()),
        status => {
            tracing::debug!(url = %url, status, "Upstream returned an error status");
            return Err(ProxyError::FetchFailed(format!(
                "Upstream responded with status {status}"
            )));
        }
    };

    tracing::debug!(url = %url, status = response.status, "Proxied fetch");
    Ok(FetchProxyResponse {
        success: true,
        status: response.status,
        headers,
        body,
    })
}

async fn parse_article(state: &AppState, request: ParseRequest) -> Result<ParseResponse, ProxyError> {
    let url: Url = state.validator.validate(&request.url)?;
    let limits = &state.config.limits;
    let timeout = limits.clamp_timeout(request.timeout, limits.default_timeout_ms);
    let limit = limits.max_html_bytes;

    let upstream = FetchRequest::get(url.clone(), timeout, limit).header("Accept", HTML_ACCEPT);
    let response = fetch_upstream(state, upstream, timeout, limit).await?;
    if !response.is_success() {
        tracing::debug!(url = %url, status = response.status, "Article page returned an error status");
        return Err(ProxyError::FetchFailed(format!(
            "Upstream responded with status {}",
            response.status
        )));
    }

    let html = response.text();
    let article = tokio::task::spawn_blocking(move || extract_article(&html, &url))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Article extraction task failed");
            ProxyError::ParseFailed("Could not extract readable content".to_owned())
        })??;

    Ok(ParseResponse::new(article, request.format))
}
