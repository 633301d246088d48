//! Classification of whatever the user typed into the "add feed" box.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

/// What a raw input string most likely refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputClassification {
    /// A bare handle such as `jdoe` or `@jdoe` (leading `@` removed).
    Username(String),
    Feed(Url),
    Article(Url),
    Homepage(Url),
}

impl InputClassification {
    /// Wire name reported as `input_type`.
    pub fn input_type(&self) -> &'static str {
        match self {
            InputClassification::Username(_) => "username",
            InputClassification::Feed(_) => "feed",
            InputClassification::Article(_) => "article",
            InputClassification::Homepage(_) => "homepage",
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Input is empty")]
    Empty,
    #[error("Input is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@?[A-Za-z0-9_-]+$").expect("valid regex"))
}

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("valid regex"))
}

fn dated_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\d{4}/").expect("valid regex"))
}

fn blog_post_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/blog/[^/]+").expect("valid regex"))
}

/// Homepage derivation patterns, tried in this order. Group 1 is the prefix
/// kept in front of the article-specific part. Case-insensitive, like the
/// article check in [`classify`].
fn homepage_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"(?i)^(.*)/\d{4}/\d{2}(?:/|$)",
            r"(?i)^(.*)/\d{4}(?:/|$)",
            r"(?i)^(.*)/posts?(?:/|$)",
            r"(?i)^(.*)/articles?(?:/|$)",
            r"(?i)^(.*/blog)/[^/]+/?$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

/// Adds `https://` when the input carries no scheme.
pub fn normalize(raw: &str) -> Result<Url, ClassifyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClassifyError::Empty);
    }
    let candidate = if scheme_re().is_match(trimmed) {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };
    Ok(Url::parse(&candidate)?)
}

/// Classifies raw user input.
///
/// # Examples
///
/// ```
/// use feedgate::feed::{classify, InputClassification};
///
/// assert_eq!(classify("@jdoe").unwrap(), InputClassification::Username("jdoe".into()));
/// assert!(matches!(classify("example.com/feed.xml").unwrap(), InputClassification::Feed(_)));
/// ```
pub fn classify(raw: &str) -> Result<InputClassification, ClassifyError> {
    let trimmed = raw.trim();
    if username_re().is_match(trimmed) {
        let name = trimmed.strip_prefix('@').unwrap_or(trimmed);
        return Ok(InputClassification::Username(name.to_owned()));
    }

    let url = normalize(trimmed)?;
    let path = url.path().to_lowercase();

    if is_feed_path(&path) {
        Ok(InputClassification::Feed(url))
    } else if is_article_path(&path) {
        Ok(InputClassification::Article(url))
    } else {
        Ok(InputClassification::Homepage(url))
    }
}

fn is_feed_path(path: &str) -> bool {
    path.ends_with(".xml")
        || path.ends_with(".rss")
        || path.ends_with(".atom")
        || path.contains("/feed")
        || path.contains("/rss")
        || path.contains("/atom")
}

fn is_article_path(path: &str) -> bool {
    dated_segment_re().is_match(path)
        || ["/post/", "/posts/", "/article/", "/articles/"]
            .iter()
            .any(|p| path.contains(p))
        || blog_post_re().is_match(path)
}

/// Strips the article-specific tail of `article` to find the site homepage.
///
/// Returns `origin + prefix` for the first matching pattern, or the bare
/// origin (no trailing slash).
pub fn derive_homepage(article: &Url) -> String {
    let origin = article.origin().ascii_serialization();
    let path = article.path();

    homepage_patterns()
        .iter()
        .find_map(|re| re.captures(path))
        .and_then(|caps| caps.get(1))
        .map(|prefix| format!("{origin}{}", prefix.as_str()))
        .unwrap_or(origin)
}
