//! End-to-end feed discovery for one user input.
//!
//! ```text
//! classify ─┬─ username ──────────────▶ platform suggestions
//!           ├─ feed ──── fetch + sniff ─┬─ analyze ──▶ response
//!           │                          └─ (not a feed) ─┐
//!           ├─ article ─ derive homepage ───────────────┤
//!           └─ homepage ────────────────────────────────┴─▶ scan page, probe, analyze first
//! ```
//!
//! Every URL is validated before it is fetched. The caller's timeout is one
//! budget for the whole operation, split between the page fetch, probing and
//! the feed fetch.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::config::Limits;
use crate::content::{inspect_page, PageDetails, PageImages, PageMetadata};
use crate::error::ProxyError;
use crate::feed::{
    analyze_bytes, classify, derive_homepage, feed_marker, looks_like_feed, ContentDepthSignal,
    FeedAnalysis, FeedCandidate, FeedDiscoveryEngine, FeedKind, FeedSummary, InputClassification,
    RecentPost,
};
use crate::fetch::{FetchError, FetchRequest, Fetcher, FEED_ACCEPT, HTML_ACCEPT};
use crate::util::UrlSafetyValidator;

const NO_FEED_MESSAGE: &str = "No RSS or Atom feed was found for this site";

/// Percentage of the budget given to each phase. Favicon probing runs
/// alongside the feed fetch. The last `SLACK_PERCENT` is never handed to a
/// phase, so work started in time finishes before the outer deadline.
const PAGE_PERCENT: u32 = 30;
const PROBE_PERCENT: u32 = 40;
const FEED_PERCENT: u32 = 20;
const FAVICON_PERCENT: u32 = 10;
const SLACK_PERCENT: u32 = 100 - PAGE_PERCENT - PROBE_PERCENT - FEED_PERCENT;

#[derive(Debug, Clone, Copy)]
struct Budget {
    total: Duration,
    started: Instant,
}

impl Budget {
    fn start(total: Duration) -> Self {
        Self {
            total,
            started: Instant::now(),
        }
    }

    fn share(&self, percent: u32) -> Duration {
        self.total * percent / 100
    }

    /// Point after which no phase may still be running.
    fn phase_deadline(&self) -> Instant {
        self.started + self.share(100 - SLACK_PERCENT)
    }

    /// `percent` of the budget, cut short by the phase deadline.
    fn slice(&self, percent: u32) -> Duration {
        self.share(percent)
            .min(self.phase_deadline().saturating_duration_since(Instant::now()))
    }

    fn page(&self) -> Duration {
        self.slice(PAGE_PERCENT)
    }

    fn probing(&self) -> Duration {
        self.slice(PROBE_PERCENT)
    }

    fn feed(&self) -> Duration {
        self.slice(FEED_PERCENT)
    }

    fn favicon(&self) -> Duration {
        self.slice(FAVICON_PERCENT)
    }
}

/// A feed URL on a hosting platform, guessed from a bare username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformSuggestion {
    pub platform: &'static str,
    pub feed_url: String,
    pub profile_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformHint {
    pub success: bool,
    pub platform_hint: bool,
    pub input: String,
    pub suggestions: Vec<PlatformSuggestion>,
}

/// Result of discovery for a URL input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoverResponse {
    pub success: bool,
    pub input_type: &'static str,
    pub normalized_url: String,
    pub feeds: Vec<FeedCandidate>,
    pub recommended_feed: Option<FeedCandidate>,
    pub metadata: PageMetadata,
    pub images: PageImages,
    pub content_analysis: Option<ContentDepthSignal>,
    pub recent_posts: Vec<RecentPost>,
    pub feed_summary: Option<FeedSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DiscoverResponse {
    fn new(
        input_type: &'static str,
        normalized_url: &Url,
        feeds: Vec<FeedCandidate>,
        page: PageDetails,
        analysis: Option<FeedAnalysis>,
    ) -> Self {
        let mut metadata = page.metadata;
        let (content_analysis, recent_posts, feed_summary) = match analysis {
            Some(analysis) => {
                let summary = analysis.summary;
                metadata.title = metadata.title.or_else(|| Some(summary.title.clone()));
                metadata.description = metadata.description.or_else(|| summary.description.clone());
                metadata.language = metadata.language.or_else(|| summary.language.clone());
                (Some(analysis.signal), analysis.posts, Some(summary))
            }
            None => (None, Vec::new(), None),
        };

        Self {
            success: true,
            input_type,
            normalized_url: normalized_url.to_string(),
            recommended_feed: feeds.first().cloned(),
            message: feeds.is_empty().then(|| NO_FEED_MESSAGE.to_owned()),
            feeds,
            metadata,
            images: page.images,
            content_analysis,
            recent_posts,
            feed_summary,
        }
    }
}

/// Either platform suggestions (username input) or a discovery result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DiscoverOutcome {
    Platforms(PlatformHint),
    Discovered(DiscoverResponse),
}

/// Fixed feed locations for a handle on the supported platforms.
pub fn platform_suggestions(username: &str) -> Vec<PlatformSuggestion> {
    let lower = username.to_ascii_lowercase();
    vec![
        PlatformSuggestion {
            platform: "Medium",
            feed_url: format!("https://medium.com/feed/@{username}"),
            profile_url: format!("https://medium.com/@{username}"),
        },
        PlatformSuggestion {
            platform: "Substack",
            feed_url: format!("https://{lower}.substack.com/feed"),
            profile_url: format!("https://{lower}.substack.com"),
        },
        PlatformSuggestion {
            platform: "DEV",
            feed_url: format!("https://dev.to/feed/{username}"),
            profile_url: format!("https://dev.to/{username}"),
        },
    ]
}

/// Composes classification, validation, page scanning, probing and analysis.
#[derive(Clone)]
pub struct DiscoveryOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    validator: UrlSafetyValidator,
    engine: FeedDiscoveryEngine,
    limits: Limits,
}

impl DiscoveryOrchestrator {
    pub fn new(fetcher: Arc<dyn Fetcher>, validator: UrlSafetyValidator, limits: Limits) -> Self {
        let engine = FeedDiscoveryEngine::new(fetcher.clone(), validator.clone());
        Self {
            fetcher,
            validator,
            engine,
            limits,
        }
    }

    /// Discovers feeds for `raw` within `timeout_ms` (clamped to the
    /// configured maximum).
    pub async fn discover(
        &self,
        raw: &str,
        timeout_ms: Option<u64>,
    ) -> Result<DiscoverOutcome, ProxyError> {
        let total = self
            .limits
            .clamp_timeout(timeout_ms, self.limits.discover_timeout_ms);
        let classification = classify(raw).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;
        tracing::debug!(input_type = classification.input_type(), "Classified discovery input");

        match classification {
            InputClassification::Username(name) => {
                Ok(DiscoverOutcome::Platforms(PlatformHint {
                    success: true,
                    platform_hint: true,
                    input: raw.trim().to_owned(),
                    suggestions: platform_suggestions(&name),
                }))
            }
            other => tokio::time::timeout(total, self.discover_url(other, Budget::start(total)))
                .await
                .map_err(|_| {
                    tracing::debug!(budget_ms = total.as_millis() as u64, "Discovery timed out");
                    ProxyError::Timeout
                })?
                .map(DiscoverOutcome::Discovered),
        }
    }

    async fn discover_url(
        &self,
        classification: InputClassification,
        budget: Budget,
    ) -> Result<DiscoverResponse, ProxyError> {
        match classification {
            InputClassification::Feed(url) => {
                self.validator.check(&url)?;
                if let Some(response) = self.discover_feed_direct(&url, budget).await? {
                    return Ok(response);
                }
                let origin = origin_of(&url)?;
                tracing::debug!(url = %url, origin = %origin, "Feed URL is not a feed, scanning origin");
                self.discover_site("feed", &origin, budget).await
            }
            InputClassification::Article(url) => {
                self.validator.check(&url)?;
                let homepage = Url::parse(&derive_homepage(&url)).map_err(|e| {
                    tracing::debug!(url = %url, error = %e, "Derived homepage is not a URL");
                    ProxyError::DiscoveryFailed("Could not determine the site homepage".to_owned())
                })?;
                self.validator.check(&homepage)?;
                self.discover_site("article", &homepage, budget).await
            }
            InputClassification::Homepage(url) => {
                self.validator.check(&url)?;
                self.discover_site("homepage", &url, budget).await
            }
            InputClassification::Username(_) => Err(ProxyError::DiscoveryFailed(
                "Username input has no URL to discover".to_owned(),
            )),
        }
    }

    /// Fetches a feed-looking URL. `None` means "not a feed here"; the caller
    /// falls back to the site's homepage.
    async fn discover_feed_direct(
        &self,
        url: &Url,
        budget: Budget,
    ) -> Result<Option<DiscoverResponse>, ProxyError> {
        let limit = self.limits.max_feed_bytes;
        let timeout = budget.page();
        let request = FetchRequest::get(url.clone(), timeout, limit).header("Accept", FEED_ACCEPT);

        let response = match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
            Ok(Ok(response)) if response.is_success() => response,
            Ok(Ok(response)) => {
                tracing::debug!(url = %url, status = response.status, "Feed URL returned an error status");
                return Ok(None);
            }
            Ok(Err(FetchError::ResponseTooLarge)) => {
                return Err(ProxyError::ContentTooLarge { limit })
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "Feed URL could not be fetched");
                return Ok(None);
            }
            Err(_) => {
                tracing::debug!(url = %url, "Feed URL fetch timed out");
                return Ok(None);
            }
        };

        if !looks_like_feed(&response.body) {
            return Ok(None);
        }

        let analysis = analyze_bytes(&response.body);
        let candidate = FeedCandidate {
            url: url.to_string(),
            title: analysis.as_ref().map(|a| a.summary.title.clone()),
            kind: sniff_kind(&response.content_type(), &response.body),
        };
        Ok(Some(DiscoverResponse::new(
            "feed",
            url,
            vec![candidate],
            PageDetails::default(),
            analysis,
        )))
    }

    async fn discover_site(
        &self,
        input_type: &'static str,
        page_url: &Url,
        budget: Budget,
    ) -> Result<DiscoverResponse, ProxyError> {
        let document = self.fetch_page(page_url, budget.page()).await?;
        let mut page = document
            .as_deref()
            .map(|html| inspect_page(html, page_url))
            .unwrap_or_default();

        let origin = origin_of(page_url)?;
        let feeds = self
            .engine
            .discover(document.as_deref(), page_url, &origin, budget.probing())
            .await;

        let declared_favicon = page.images.favicon.take();
        let favicon = async {
            match declared_favicon {
                Some(favicon) => Some(favicon),
                None if budget.favicon().is_zero() => None,
                None => self.probe_favicon(&origin, budget.favicon()).await,
            }
        };
        let analysis = async {
            match feeds.first() {
                Some(candidate) if !budget.feed().is_zero() => {
                    self.analyze_candidate(candidate, budget.feed()).await
                }
                _ => None,
            }
        };
        let (favicon, analysis) = tokio::join!(favicon, analysis);
        page.images.favicon = favicon;

        tracing::info!(
            url = %page_url,
            feeds = feeds.len(),
            analyzed = analysis.is_some(),
            "Discovery finished"
        );
        Ok(DiscoverResponse::new(input_type, page_url, feeds, page, analysis))
    }

    /// Page body, or `None` when it cannot be had in time. Only an oversized
    /// page is an error.
    async fn fetch_page(&self, url: &Url, timeout: Duration) -> Result<Option<String>, ProxyError> {
        let limit = self.limits.max_html_bytes;
        let request = FetchRequest::get(url.clone(), timeout, limit).header("Accept", HTML_ACCEPT);

        match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
            Ok(Ok(response)) if response.is_success() => Ok(Some(response.text())),
            Ok(Ok(response)) => {
                tracing::debug!(url = %url, status = response.status, "Page returned an error status");
                Ok(None)
            }
            Ok(Err(FetchError::ResponseTooLarge)) => Err(ProxyError::ContentTooLarge { limit }),
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "Page fetch failed, continuing without it");
                Ok(None)
            }
            Err(_) => {
                tracing::debug!(url = %url, "Page fetch timed out, continuing without it");
                Ok(None)
            }
        }
    }

    /// Fetches and analyzes the candidate. Any failure yields `None`.
    async fn analyze_candidate(
        &self,
        candidate: &FeedCandidate,
        timeout: Duration,
    ) -> Option<FeedAnalysis> {
        let url = Url::parse(&candidate.url).ok()?;
        if let Err(e) = self.validator.check(&url) {
            tracing::debug!(url = %url, error = %e, "Skipping unsafe feed candidate");
            return None;
        }

        let request = FetchRequest::get(url.clone(), timeout, self.limits.max_feed_bytes)
            .header("Accept", FEED_ACCEPT);
        match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
            Ok(Ok(response)) if response.is_success() => analyze_bytes(&response.body),
            Ok(Ok(response)) => {
                tracing::debug!(url = %url, status = response.status, "Feed candidate returned an error status");
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "Feed candidate fetch failed");
                None
            }
            Err(_) => {
                tracing::debug!(url = %url, "Feed candidate fetch timed out");
                None
            }
        }
    }

    /// `HEAD /favicon.ico` on the origin; a 2xx non-HTML answer counts.
    async fn probe_favicon(&self, origin: &Url, timeout: Duration) -> Option<String> {
        let url = origin.join("/favicon.ico").ok()?;
        self.validator.check(&url).ok()?;

        let request = FetchRequest::head(url.clone(), timeout);
        let response = tokio::time::timeout(timeout, self.fetcher.fetch(request))
            .await
            .ok()?
            .ok()?;
        (response.is_success() && !response.content_type().contains("html")).then(|| url.to_string())
    }
}

fn origin_of(url: &Url) -> Result<Url, ProxyError> {
    Url::parse(&url.origin().ascii_serialization()).map_err(|e| {
        tracing::debug!(url = %url, error = %e, "URL has no usable origin");
        ProxyError::DiscoveryFailed("Could not determine the site origin".to_owned())
    })
}

/// Feed kind from the response MIME type, else from the root element.
fn sniff_kind(content_type: &str, body: &[u8]) -> FeedKind {
    match FeedKind::from_mime(content_type) {
        FeedKind::Unknown => match feed_marker(body) {
            Some("<feed") => FeedKind::Atom,
            Some(_) => FeedKind::Rss,
            None => FeedKind::Unknown,
        },
        kind => kind,
    }
}
