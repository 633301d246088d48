//! Error kinds shared by every proxy operation.
//!
//! Each endpoint reports failures as `{success: false, error: {code, message}}`.
//! Request-shape failures (bad JSON, missing or malformed URL, auth, method)
//! use a non-200 status; failures reached while proxying the open internet
//! (blocked target, fetch failure, timeout, oversize, parse failure) are
//! normal outcomes and are reported with `200 OK`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::util::UrlValidationError;

/// Machine-readable category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUrl,
    BlockedUrl,
    FetchFailed,
    Timeout,
    ContentTooLarge,
    ParseFailed,
    DiscoveryFailed,
}

impl ErrorKind {
    /// Wire code sent to the browser.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "INVALID_URL",
            ErrorKind::BlockedUrl => "BLOCKED_URL",
            ErrorKind::FetchFailed => "FETCH_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ContentTooLarge => "CONTENT_TOO_LARGE",
            ErrorKind::ParseFailed => "PARSE_FAILED",
            ErrorKind::DiscoveryFailed => "DISCOVERY_FAILED",
        }
    }

    /// Only malformed input is the caller's fault; everything else is an
    /// expected outcome of proxying.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidUrl => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        }
    }
}

/// Failure of a proxy operation, carrying a message that is safe to show.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidUrl(String),
    #[error("{0}")]
    BlockedUrl(String),
    #[error("{0}")]
    FetchFailed(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Content exceeds the {limit} byte limit")]
    ContentTooLarge { limit: usize },
    #[error("{0}")]
    ParseFailed(String),
    #[error("{0}")]
    DiscoveryFailed(String),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            ProxyError::BlockedUrl(_) => ErrorKind::BlockedUrl,
            ProxyError::FetchFailed(_) => ErrorKind::FetchFailed,
            ProxyError::Timeout => ErrorKind::Timeout,
            ProxyError::ContentTooLarge { .. } => ErrorKind::ContentTooLarge,
            ProxyError::ParseFailed(_) => ErrorKind::ParseFailed,
            ProxyError::DiscoveryFailed(_) => ErrorKind::DiscoveryFailed,
        }
    }

    /// Maps a fetch failure, recording the size ceiling that applied.
    pub fn from_fetch(err: FetchError, limit: usize) -> Self {
        match err {
            FetchError::Timeout => ProxyError::Timeout,
            FetchError::ResponseTooLarge => ProxyError::ContentTooLarge { limit },
            FetchError::Network(e) => {
                tracing::debug!(error = %e, "Upstream request failed");
                ProxyError::FetchFailed("Could not reach the requested URL".to_owned())
            }
            FetchError::Unavailable(reason) => {
                tracing::debug!(reason = %reason, "Upstream request failed");
                ProxyError::FetchFailed("Could not reach the requested URL".to_owned())
            }
        }
    }
}

impl From<UrlValidationError> for ProxyError {
    fn from(err: UrlValidationError) -> Self {
        match err.kind() {
            ErrorKind::BlockedUrl => ProxyError::BlockedUrl(err.to_string()),
            _ => ProxyError::InvalidUrl(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = ErrorEnvelope::new(kind.code(), self.to_string());
        (kind.status(), Json(body)).into_response()
    }
}

/// Rejections raised before a request reaches an operation.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request body must be a JSON object: {0}")]
    MalformedBody(String),
    #[error("Missing or invalid API key")]
    Unauthorized,
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            RequestError::MalformedBody(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            RequestError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            RequestError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED")
            }
        };
        (status, Json(ErrorEnvelope::new(code, self.to_string()))).into_response()
    }
}
