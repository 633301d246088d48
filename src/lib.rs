//! feedgate: a CORS proxy for browser feed readers.
//!
//! Three endpoints do the work, all behind an SSRF gate:
//!
//! - `/discover` finds feeds for a homepage, article, feed URL or username
//! - `/fetch` relays a feed with conditional-request headers
//! - `/parse` extracts and sanitizes the readable content of an article
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedgate::config::Config;
//! use feedgate::fetch::HttpFetcher;
//! use feedgate::server::{router, AppState};
//! use feedgate::util::UrlSafetyValidator;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let validator = UrlSafetyValidator::with_extra_hosts(config.blocked_hosts.iter().cloned());
//! let fetcher = Arc::new(HttpFetcher::new(&config.user_agent, validator)?);
//! let app = router(Arc::new(AppState::new(config, fetcher)));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8787").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content;
pub mod discover;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod server;
pub mod util;
