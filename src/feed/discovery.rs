use futures::future::join_all;
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::fetch::{FetchRequest, Fetcher, FEED_ACCEPT};
use crate::util::{resolve_url, UrlSafetyValidator};

/// Well-known feed locations, probed in this order.
pub const PROBE_PATHS: &[&str] = &[
    "/feed",
    "/rss",
    "/atom.xml",
    "/feed.xml",
    "/rss.xml",
    "/index.xml",
    "/feeds/posts/default",
    "/blog/feed",
    "/feed/rss",
    "/feed/atom",
];

/// Probes issued concurrently per batch.
pub const PROBE_BATCH_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Rss,
    Atom,
    Unknown,
}

impl FeedKind {
    /// Reads the kind from a MIME type such as `application/atom+xml`.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("atom") {
            FeedKind::Atom
        } else if mime.contains("rss") {
            FeedKind::Rss
        } else {
            FeedKind::Unknown
        }
    }
}

/// A feed reference found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedCandidate {
    pub url: String,
    pub title: Option<String>,
    pub kind: FeedKind,
}

/// Locates feeds for a site: declared `<link>` tags first, then a bounded
/// probe of common paths.
#[derive(Clone)]
pub struct FeedDiscoveryEngine {
    fetcher: Arc<dyn Fetcher>,
    validator: UrlSafetyValidator,
}

impl FeedDiscoveryEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>, validator: UrlSafetyValidator) -> Self {
        Self { fetcher, validator }
    }

    /// Runs both phases. Probing only happens when the document declares no
    /// feeds. An empty result means "no feed discovered".
    pub async fn discover(
        &self,
        document: Option<&str>,
        base_url: &Url,
        origin: &Url,
        budget: Duration,
    ) -> Vec<FeedCandidate> {
        let declared = document
            .map(|html| declared_feeds(html, base_url))
            .unwrap_or_default();
        if !declared.is_empty() {
            tracing::debug!(count = declared.len(), base = %base_url, "Found declared feeds");
            return declared;
        }
        self.probe(origin, budget).await
    }

    /// Probes [`PROBE_PATHS`] against `origin` in batches of
    /// [`PROBE_BATCH_SIZE`], stopping after the first batch with a hit.
    pub async fn probe(&self, origin: &Url, budget: Duration) -> Vec<FeedCandidate> {
        let batches = PROBE_PATHS.len().div_ceil(PROBE_BATCH_SIZE);
        let slice = budget / batches as u32;

        for (index, batch) in PROBE_PATHS.chunks(PROBE_BATCH_SIZE).enumerate() {
            let probes = batch.iter().map(|path| self.probe_one(origin, path, slice));
            let hits: Vec<FeedCandidate> = join_all(probes).await.into_iter().flatten().collect();

            if !hits.is_empty() {
                tracing::debug!(batch = index, hits = hits.len(), origin = %origin, "Feed probe hit");
                return hits;
            }
        }

        tracing::debug!(origin = %origin, "No feed found by probing");
        Vec::new()
    }

    async fn probe_one(&self, origin: &Url, path: &str, timeout: Duration) -> Option<FeedCandidate> {
        let url = origin.join(path).ok()?;
        if let Err(e) = self.validator.check(&url) {
            tracing::debug!(url = %url, error = %e, "Skipping unsafe probe URL");
            return None;
        }

        let request = FetchRequest::head(url.clone(), timeout).header("Accept", FEED_ACCEPT);
        let response = match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::trace!(url = %url, error = %e, "Probe failed");
                return None;
            }
            Err(_) => {
                tracing::trace!(url = %url, "Probe timed out");
                return None;
            }
        };

        let content_type = response.content_type();
        let is_feed = response.is_success()
            && ["xml", "rss", "atom"].iter().any(|m| content_type.contains(m));
        is_feed.then(|| FeedCandidate {
            url: url.to_string(),
            title: None,
            kind: FeedKind::from_mime(&content_type),
        })
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Scans `<link rel="alternate">` tags with an RSS or Atom type.
///
/// Relative hrefs resolve against the document's `<base href>` when present,
/// else against `base_url`. Document order is kept.
pub fn declared_feeds(html: &str, base_url: &Url) -> Vec<FeedCandidate> {
    let doc = Html::parse_document(html);
    let base = document_base(&doc, base_url);

    doc.select(&selector("link[rel][href]"))
        .filter_map(|link| {
            let el = link.value();
            let is_alternate = el
                .attr("rel")?
                .split_ascii_whitespace()
                .any(|rel| rel.eq_ignore_ascii_case("alternate"));
            let mime = el.attr("type")?.to_ascii_lowercase();
            if !is_alternate || !(mime.contains("rss") || mime.contains("atom")) {
                return None;
            }
            Some(FeedCandidate {
                url: resolve_url(el.attr("href")?, &base)?,
                title: el
                    .attr("title")
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned),
                kind: FeedKind::from_mime(&mime),
            })
        })
        .collect()
}

/// Effective base URL of a parsed document.
pub fn document_base(doc: &Html, fallback: &Url) -> Url {
    doc.select(&selector("base[href]"))
        .next()
        .and_then(|b| b.value().attr("href"))
        .and_then(|href| fallback.join(href.trim()).ok())
        .unwrap_or_else(|| fallback.clone())
}
