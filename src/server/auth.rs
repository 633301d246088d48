use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use super::{sha256, AppState};
use crate::error::RequestError;

pub(super) const API_KEY_HEADER: &str = "x-api-key";

/// Rejects requests without the configured API key. `OPTIONS` requests and
/// servers without a key pass through.
pub(super) async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key_digest.as_ref() else {
        return next.run(request).await;
    };
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let authorized = presented_key(request.headers()).map(|key| digests_match(&sha256(key), expected));
    if authorized == Some(true) {
        return next.run(request).await;
    }

    tracing::warn!(
        path = %request.uri().path(),
        key_present = authorized.is_some(),
        "Rejected request with missing or invalid API key"
    );
    RequestError::Unauthorized.into_response()
}

/// Key from `x-api-key`, else from `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key.trim());
    }
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = auth.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
}

/// Compares two digests without short-circuiting.
fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
