//! Integration tests for the HTTP surface: routing, CORS, authentication and
//! the three proxy endpoints.
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.
//! Upstream sites are served by an in-process fake fetcher, so nothing here
//! touches the network.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use feedgate::config::Config;
use feedgate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};
use feedgate::server::{router, AppState};

// ============================================================================
// Fake upstream
// ============================================================================

#[derive(Clone)]
enum Upstream {
    Page {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: String,
    },
    TooLarge,
}

#[derive(Default)]
struct FakeUpstream {
    routes: HashMap<String, Upstream>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeUpstream {
    fn page(
        mut self,
        url: &str,
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &str,
    ) -> Self {
        self.routes.insert(
            url.to_owned(),
            Upstream::Page {
                status,
                headers,
                body: body.to_owned(),
            },
        );
        self
    }

    fn too_large(mut self, url: &str) -> Self {
        self.routes.insert(url.to_owned(), Upstream::TooLarge);
        self
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeUpstream {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url.to_string();
        self.requests.lock().unwrap().push(request);
        match self.routes.get(&url) {
            Some(Upstream::Page {
                status,
                headers,
                body,
            }) => Ok(FetchResponse {
                status: *status,
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: body.as_bytes().to_vec(),
            }),
            Some(Upstream::TooLarge) => Err(FetchError::ResponseTooLarge),
            None => Ok(FetchResponse {
                status: 404,
                ..Default::default()
            }),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn app_with(config: Config, upstream: Arc<FakeUpstream>) -> Router {
    router(Arc::new(AppState::new(config, upstream)))
}

fn app(upstream: Arc<FakeUpstream>) -> Router {
    app_with(Config::default(), upstream)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

const ARTICLE_HTML: &str = r#"<html><head>
<title>Understanding Ownership</title>
<meta name="author" content="Jane Doe">
<meta property="og:site_name" content="Example Blog">
<meta property="og:description" content="A short tour of ownership.">
<meta property="og:image" content="/images/cover.png">
</head><body>
<nav><a href="/">Home</a> <a href="/about">About</a></nav>
<article>
<h1>Understanding Ownership</h1>
<p>Ownership is the feature that lets Rust make memory safety guarantees without a garbage collector. Every value has a single owner, and when the owner goes out of scope the value is dropped.</p>
<p>Borrowing lets code use a value without taking ownership of it. References must always be valid, and the compiler checks this for every function in the program.</p>
<p>Together these rules remove whole classes of bugs such as use after free and data races, while keeping the runtime cost at zero. <a href="javascript:alert(1)">Try it</a></p>
<script>trackPageView()</script>
</article>
</body></html>"#;

// ============================================================================
// Routing, CORS and authentication
// ============================================================================

#[tokio::test]
async fn test_health_reports_provider_and_capabilities() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(Arc::new(FakeUpstream::default())), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["provider"], json!("feedgate"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
    assert_eq!(body["capabilities"], json!(["discover", "fetch", "parse"]));
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let upstream = Arc::new(FakeUpstream::default());

    let request = Request::builder()
        .method(Method::GET)
        .uri("/discover")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(upstream.clone()), request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("METHOD_NOT_ALLOWED"));

    let (status, _) = send(app(upstream), post_json("/health", json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_options_is_204() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/fetch")
        .body(Body::empty())
        .unwrap();
    let response = app(Arc::new(FakeUpstream::default()))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_cors_preflight() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/parse")
        .header(header::ORIGIN, "https://reader.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,x-api-key")
        .body(Body::empty())
        .unwrap();
    let response = app(Arc::new(FakeUpstream::default()))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let allowed = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .to_owned();
    assert!(allowed.contains("POST"));
}

#[tokio::test]
async fn test_cors_origin_list() {
    let config = Config {
        cors_origins: vec!["https://reader.example.com".into()],
        ..Config::default()
    };
    let upstream = Arc::new(FakeUpstream::default());

    let allowed = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://reader.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app_with(config, upstream.clone())
        .oneshot(allowed)
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://reader.example.com"
    );

    let config = Config {
        cors_origins: vec!["https://reader.example.com".into()],
        ..Config::default()
    };
    let denied = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://evil.example.net")
        .body(Body::empty())
        .unwrap();
    let response = app_with(config, upstream).oneshot(denied).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

fn keyed_config() -> Config {
    Config::default().with_api_key_override(Some("s3cret".into()))
}

#[tokio::test]
async fn test_missing_api_key_is_401() {
    let upstream = Arc::new(FakeUpstream::default());
    let (status, body) = send(
        app_with(keyed_config(), upstream.clone()),
        post_json("/discover", json!({"url": "jdoe"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("UNAUTHORIZED"));

    let mut request = post_json("/discover", json!({"url": "jdoe"}));
    request
        .headers_mut()
        .insert("x-api-key", "wrong".parse().unwrap());
    let (status, _) = send(app_with(keyed_config(), upstream), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_api_key_accepted_in_either_header() {
    let upstream = Arc::new(FakeUpstream::default());

    let mut request = post_json("/discover", json!({"url": "jdoe"}));
    request
        .headers_mut()
        .insert("x-api-key", "s3cret".parse().unwrap());
    let (status, _) = send(app_with(keyed_config(), upstream.clone()), request).await;
    assert_eq!(status, StatusCode::OK);

    let mut request = post_json("/discover", json!({"url": "jdoe"}));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
    let (status, _) = send(app_with(keyed_config(), upstream), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_options_skips_authentication() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/discover")
        .body(Body::empty())
        .unwrap();
    let response = app_with(keyed_config(), Arc::new(FakeUpstream::default()))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/fetch")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app(Arc::new(FakeUpstream::default())), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("INVALID_REQUEST"));

    let (status, _) = send(
        app(Arc::new(FakeUpstream::default())),
        post_json("/parse", json!({"format": "html"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// /fetch
// ============================================================================

#[tokio::test]
async fn test_fetch_relays_feed_with_filtered_headers() {
    let upstream = Arc::new(FakeUpstream::default().page(
        "https://example.com/feed.xml",
        200,
        vec![
            ("content-type", "application/rss+xml"),
            ("etag", "\"v2\""),
            ("set-cookie", "session=abc"),
            ("server", "nginx"),
        ],
        "<rss><channel></channel></rss>",
    ));

    let (status, body) = send(
        app(upstream.clone()),
        post_json(
            "/fetch",
            json!({
                "url": "https://example.com/feed.xml",
                "headers": {"If-None-Match": "\"v1\"", "Cookie": "a=b", "Authorization": "x"}
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "status": 200,
            "headers": {"content-type": "application/rss+xml", "etag": "\"v2\""},
            "body": "<rss><channel></channel></rss>"
        })
    );

    let sent = &upstream.requests()[0];
    assert!(sent
        .headers
        .iter()
        .any(|(k, v)| k == "if-none-match" && v == "\"v1\""));
    assert!(!sent
        .headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("cookie") || k.eq_ignore_ascii_case("authorization")));
}

#[tokio::test]
async fn test_fetch_not_modified_has_null_body() {
    let upstream = Arc::new(FakeUpstream::default().page(
        "https://example.com/feed.xml",
        304,
        vec![("etag", "\"v1\"")],
        "",
    ));
    let (status, body) = send(
        app(upstream),
        post_json("/fetch", json!({"url": "https://example.com/feed.xml"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["status"], json!(304));
    assert_eq!(body["body"], Value::Null);
}

#[tokio::test]
async fn test_fetch_upstream_error_status_is_fetch_failed() {
    let upstream = Arc::new(FakeUpstream::default().page(
        "https://example.com/feed.xml",
        503,
        vec![],
        "down",
    ));
    let (status, body) = send(
        app(upstream),
        post_json("/fetch", json!({"url": "https://example.com/feed.xml"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("FETCH_FAILED"));
}

#[tokio::test]
async fn test_fetch_blocked_target_is_200_blocked_url() {
    let upstream = Arc::new(FakeUpstream::default());
    for target in [
        "http://localhost:8080/admin",
        "http://10.0.0.5/",
        "http://169.254.169.254/latest/meta-data/",
        "http://[::1]/",
        "http://printer.local/",
    ] {
        let (status, body) = send(app(upstream.clone()), post_json("/fetch", json!({"url": target}))).await;
        assert_eq!(status, StatusCode::OK, "{target}");
        assert_eq!(body["error"]["code"], json!("BLOCKED_URL"), "{target}");
    }
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn test_fetch_invalid_url_is_400() {
    for target in ["not a url", "ftp://example.com/feed", ""] {
        let (status, body) = send(
            app(Arc::new(FakeUpstream::default())),
            post_json("/fetch", json!({"url": target})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{target}");
        assert_eq!(body["error"]["code"], json!("INVALID_URL"), "{target}");
    }
}

#[tokio::test]
async fn test_fetch_too_large() {
    let upstream = Arc::new(FakeUpstream::default().too_large("https://example.com/huge.xml"));
    let (status, body) = send(
        app(upstream),
        post_json("/fetch", json!({"url": "https://example.com/huge.xml"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], json!("CONTENT_TOO_LARGE"));
}

// ============================================================================
// /parse
// ============================================================================

#[tokio::test]
async fn test_parse_returns_sanitized_html() {
    let upstream = Arc::new(FakeUpstream::default().page(
        "https://example.com/2024/05/ownership",
        200,
        vec![("content-type", "text/html")],
        ARTICLE_HTML,
    ));
    let (status, body) = send(
        app(upstream),
        post_json("/parse", json!({"url": "https://example.com/2024/05/ownership"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["byline"], json!("Jane Doe"));
    assert_eq!(body["siteName"], json!("Example Blog"));
    assert_eq!(body["excerpt"], json!("A short tour of ownership."));
    assert_eq!(body["image"], json!("https://example.com/images/cover.png"));
    assert!(body["length"].as_u64().unwrap() > 0);

    let html = body["htmlContent"].as_str().unwrap();
    assert_eq!(body["content"].as_str().unwrap(), html);
    assert!(html.contains("Borrowing lets code use a value"));
    assert!(!html.contains("<script"));
    assert!(!html.contains("javascript:"));
    assert!(body.get("textContent").is_none());
}

#[tokio::test]
async fn test_parse_text_format() {
    let upstream = Arc::new(FakeUpstream::default().page(
        "https://example.com/2024/05/ownership",
        200,
        vec![("content-type", "text/html")],
        ARTICLE_HTML,
    ));
    let (_, body) = send(
        app(upstream),
        post_json(
            "/parse",
            json!({"url": "https://example.com/2024/05/ownership", "format": "text"}),
        ),
    )
    .await;

    assert!(body["textContent"]
        .as_str()
        .unwrap()
        .contains("Ownership is the feature"));
    assert!(body.get("htmlContent").is_none());
    assert!(body.get("content").is_none());
}

#[tokio::test]
async fn test_parse_upstream_404_is_fetch_failed() {
    let (status, body) = send(
        app(Arc::new(FakeUpstream::default())),
        post_json("/parse", json!({"url": "https://example.com/missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], json!("FETCH_FAILED"));
}

// ============================================================================
// /discover
// ============================================================================

#[tokio::test]
async fn test_discover_username_suggestions() {
    let (status, body) = send(
        app(Arc::new(FakeUpstream::default())),
        post_json("/discover", json!({"url": "@jdoe"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["platform_hint"], json!(true));
    assert_eq!(body["input"], json!("@jdoe"));
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
    assert_eq!(
        body["suggestions"][0]["feed_url"],
        json!("https://medium.com/feed/@jdoe")
    );
}

#[tokio::test]
async fn test_discover_homepage_end_to_end() {
    let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel>
        <title>Example Blog</title><link>https://example.com/</link>
        <item><guid>1</guid><title>Hello</title><link>https://example.com/hello</link></item>
        </channel></rss>"#;
    let upstream = Arc::new(
        FakeUpstream::default()
            .page(
                "https://example.com/",
                200,
                vec![("content-type", "text/html")],
                r#"<html><head><title>Example</title>
                   <link rel="alternate" type="application/rss+xml" href="/index.xml" title="RSS">
                   </head></html>"#,
            )
            .page(
                "https://example.com/index.xml",
                200,
                vec![("content-type", "application/rss+xml")],
                rss,
            ),
    );

    let (status, body) = send(
        app(upstream),
        post_json("/discover", json!({"url": "example.com", "timeout": 5000})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["input_type"], json!("homepage"));
    assert_eq!(body["normalized_url"], json!("https://example.com/"));
    assert_eq!(
        body["recommended_feed"],
        json!({"url": "https://example.com/index.xml", "title": "RSS", "kind": "rss"})
    );
    assert_eq!(body["recent_posts"][0]["title"], json!("Hello"));
    assert_eq!(body["content_analysis"]["sample_size"], json!(1));
    assert!(body.get("message").is_none());
}

#[tokio::test]
async fn test_discover_blocked_and_oversized() {
    let (status, body) = send(
        app(Arc::new(FakeUpstream::default())),
        post_json("/discover", json!({"url": "http://192.168.1.1/"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], json!("BLOCKED_URL"));

    let upstream = Arc::new(FakeUpstream::default().too_large("https://example.com/"));
    let (status, body) = send(
        app(upstream),
        post_json("/discover", json!({"url": "https://example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], json!("CONTENT_TOO_LARGE"));
}
