use serde::Serialize;

use super::parser::{parse_feed, ParsedFeed, ParsedItem};

/// Number of recent posts reported.
const RECENT_POSTS: usize = 3;
/// Number of items inspected for the content-depth signal.
const DEPTH_SAMPLE: usize = 5;
/// Content shorter than this (in characters) is never "full".
const FULL_CONTENT_FLOOR: usize = 500;
/// Content must be this many times longer than its summary.
const SUMMARY_RATIO: f64 = 1.5;
/// Share of sampled items that must carry full content.
const FULL_CONTENT_SHARE: f64 = 0.6;

/// Channel metadata with defaults applied.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedSummary {
    pub title: String,
    pub description: Option<String>,
    pub canonical_link: Option<String>,
    pub language: Option<String>,
    pub last_build_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecentPost {
    pub title: String,
    pub link: Option<String>,
    pub pub_date: Option<String>,
}

/// Whether a feed ships whole articles or only teasers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ContentDepthSignal {
    pub has_full_content: bool,
    pub average_content_length: usize,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedAnalysis {
    pub summary: FeedSummary,
    pub posts: Vec<RecentPost>,
    pub signal: ContentDepthSignal,
}

/// Parses and analyzes raw feed bytes.
///
/// A malformed feed yields `None`; callers report "feed found, metadata
/// unavailable" instead of failing.
pub fn analyze_bytes(bytes: &[u8]) -> Option<FeedAnalysis> {
    match parse_feed(bytes) {
        Ok(feed) => Some(analyze(&feed)),
        Err(e) => {
            tracing::debug!(error = %e, "Feed could not be parsed for analysis");
            None
        }
    }
}

pub fn analyze(feed: &ParsedFeed) -> FeedAnalysis {
    let summary = FeedSummary {
        title: feed
            .title
            .clone()
            .unwrap_or_else(|| "Untitled".to_owned()),
        description: feed.description.clone().filter(|d| !d.trim().is_empty()),
        canonical_link: feed.link.clone(),
        language: feed.language.clone(),
        last_build_date: feed.updated.map(|d| d.to_rfc3339()),
    };

    let posts = feed
        .items
        .iter()
        .take(RECENT_POSTS)
        .map(|item| RecentPost {
            title: item.title.clone().unwrap_or_else(|| "Untitled".to_owned()),
            link: item.link.clone(),
            pub_date: item.date().map(|d| d.to_rfc3339()),
        })
        .collect();

    FeedAnalysis {
        summary,
        posts,
        signal: content_depth(&feed.items),
    }
}

/// Computes the full-content signal over the first few items.
pub fn content_depth(items: &[ParsedItem]) -> ContentDepthSignal {
    let sample = &items[..items.len().min(DEPTH_SAMPLE)];
    if sample.is_empty() {
        return ContentDepthSignal {
            has_full_content: false,
            average_content_length: 0,
            sample_size: 0,
        };
    }

    let mut total = 0usize;
    let mut full = 0usize;
    for item in sample {
        let content_len = item.body().map_or(0, |c| c.chars().count());
        let summary_len = item.summary.as_deref().map_or(0, |s| s.chars().count());
        total += content_len;
        if content_len > FULL_CONTENT_FLOOR && content_len as f64 > summary_len as f64 * SUMMARY_RATIO
        {
            full += 1;
        }
    }

    let sample_size = sample.len();
    ContentDepthSignal {
        has_full_content: full as f64 / sample_size as f64 >= FULL_CONTENT_SHARE,
        average_content_length: (total as f64 / sample_size as f64).round() as usize,
        sample_size,
    }
}
