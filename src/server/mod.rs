//! HTTP surface of the proxy.
//!
//! ```text
//! request ──▶ preflight status ──▶ CORS ──▶ trace ──▶ API key ──▶ route ──▶ handler
//! ```
//!
//! Every route answers `OPTIONS` with `204` and any other unsupported method
//! with `405 METHOD_NOT_ALLOWED`.

mod auth;
mod handlers;

use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::Config;
use crate::discover::DiscoveryOrchestrator;
use crate::error::RequestError;
use crate::fetch::Fetcher;
use crate::util::UrlSafetyValidator;

pub use handlers::{
    DiscoverRequest, FetchProxyRequest, FetchProxyResponse, HealthResponse, ParseFormat,
    ParseRequest, ParseResponse, FORWARDED_REQUEST_HEADERS, RETURNED_RESPONSE_HEADERS,
};

/// Capabilities advertised by `/health`.
pub const CAPABILITIES: &[&str] = &["discover", "fetch", "parse"];

/// Shared, immutable state built once at startup.
pub struct AppState {
    pub config: Config,
    pub fetcher: Arc<dyn Fetcher>,
    pub validator: UrlSafetyValidator,
    pub discovery: DiscoveryOrchestrator,
    api_key_digest: Option<[u8; 32]>,
}

impl AppState {
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>) -> Self {
        use secrecy::ExposeSecret;

        let validator = UrlSafetyValidator::with_extra_hosts(config.blocked_hosts.iter().cloned());
        let discovery = DiscoveryOrchestrator::new(fetcher.clone(), validator.clone(), config.limits);
        let api_key_digest = config
            .api_key
            .as_ref()
            .map(|key| sha256(key.expose_secret()));

        Self {
            config,
            fetcher,
            validator,
            discovery,
            api_key_digest,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_digest.is_some()
    }
}

fn sha256(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route(
            "/discover",
            post(handlers::discover)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/fetch",
            post(handlers::fetch)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/parse",
            post(handlers::parse)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/health",
            get(handlers::health)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(auth::API_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(86_400));

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn method_not_allowed() -> Response {
    RequestError::MethodNotAllowed.into_response()
}

/// CORS preflights are answered by the CORS layer with `200`; report them
/// as `204` like every other `OPTIONS` request.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}
