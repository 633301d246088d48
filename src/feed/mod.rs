//! Feed classification, discovery and analysis.
//!
//! - [`classify`] - Decide what a raw user input refers to
//! - [`discovery`] - Find feed URLs for a site (declared links, then probing)
//! - [`parser`] - Turn RSS/Atom bytes into an explicit optional-field record
//! - [`analyzer`] - Summaries, recent posts and the full-content signal
//!
//! # Example
//!
//! ```ignore
//! use crate::feed::{classify, FeedDiscoveryEngine, InputClassification};
//!
//! if let InputClassification::Homepage(url) = classify("example.com")? {
//!     let feeds = engine.discover(Some(&html), &url, &url, budget).await;
//! }
//! ```

pub mod analyzer;
pub mod classify;
pub mod discovery;
pub mod parser;

pub use analyzer::{analyze, analyze_bytes, ContentDepthSignal, FeedAnalysis, FeedSummary, RecentPost};
pub use classify::{classify, derive_homepage, ClassifyError, InputClassification};
pub use discovery::{declared_feeds, FeedCandidate, FeedDiscoveryEngine, FeedKind};
pub use parser::{feed_marker, looks_like_feed, parse_feed, ParsedFeed, ParsedItem};
