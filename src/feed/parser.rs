use chrono::{DateTime, Utc};
use feed_rs::parser::{self, ParseFeedError};

use crate::util::strip_control_chars;

/// Channel-level fields of a parsed feed.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub items: Vec<ParsedItem>,
}

/// One entry with every optional field RSS and Atom may or may not carry.
///
/// Fallback order, resolved by the accessors below:
/// - date: `published`, then `updated`
/// - body: `content`, then `media_description`
/// - baseline: `summary` (RSS `description` and Atom `summary` both land here)
#[derive(Debug, Clone, Default)]
pub struct ParsedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub content: Option<String>,
    pub media_description: Option<String>,
    pub summary: Option<String>,
}

impl ParsedItem {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.published.or(self.updated)
    }

    pub fn body(&self) -> Option<&str> {
        self.content
            .as_deref()
            .or(self.media_description.as_deref())
    }
}

/// Parses RSS/Atom bytes.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let link = feed
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| feed.links.first())
        .map(|l| l.href.clone());

    let items = feed
        .entries
        .into_iter()
        .map(|entry| ParsedItem {
            title: entry
                .title
                .map(|t| strip_control_chars(&t.content).into_owned())
                .filter(|t| !t.trim().is_empty()),
            link: entry.links.first().map(|l| l.href.clone()),
            published: entry.published,
            updated: entry.updated,
            content: entry.content.and_then(|c| c.body),
            media_description: entry
                .media
                .into_iter()
                .find_map(|m| m.description.map(|d| d.content)),
            summary: entry.summary.map(|s| s.content),
        })
        .collect();

    Ok(ParsedFeed {
        title: feed
            .title
            .map(|t| strip_control_chars(&t.content).into_owned())
            .filter(|t| !t.trim().is_empty()),
        description: feed
            .description
            .map(|d| strip_control_chars(&d.content).into_owned()),
        link,
        language: feed.language,
        updated: feed.updated,
        items,
    })
}

const FEED_MARKERS: &[&str] = &["<rss", "<feed", "<channel"];

/// The first of `<rss`, `<feed` or `<channel` in the body, ignoring ASCII
/// case. Preambles (comments, stylesheets, doctypes) may run to any length,
/// so the whole body is searched.
pub fn feed_marker(bytes: &[u8]) -> Option<&'static str> {
    FEED_MARKERS
        .iter()
        .filter_map(|&marker| {
            bytes
                .windows(marker.len())
                .position(|window| window.eq_ignore_ascii_case(marker.as_bytes()))
                .map(|at| (at, marker))
        })
        .min_by_key(|&(at, _)| at)
        .map(|(_, marker)| marker)
}

/// Cheap check that a body looks like RSS or Atom before handing it to the
/// parser.
pub fn looks_like_feed(bytes: &[u8]) -> bool {
    feed_marker(bytes).is_some()
}
