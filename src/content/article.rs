use std::io::Cursor;
use url::Url;

use super::page::inspect_page;
use super::sanitize::sanitize;
use crate::error::ProxyError;
use crate::util::{collapse_whitespace, truncate_chars};

/// Characters of body text used when a page carries no description.
const EXCERPT_CHARS: usize = 200;

/// Readable content of an article page. `html_content` is sanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    pub excerpt: Option<String>,
    /// Length of `text_content` in characters.
    pub length: usize,
    pub html_content: String,
    pub text_content: String,
    pub image: Option<String>,
}

/// Isolates the main content of `html` and sanitizes it against `page_url`.
///
/// Fails with `ParseFailed` when no readable text remains.
pub fn extract_article(html: &str, page_url: &Url) -> Result<Article, ProxyError> {
    let details = inspect_page(html, page_url);

    let mut reader = Cursor::new(html.as_bytes());
    let product = readability::extractor::extract(&mut reader, page_url).map_err(|e| {
        tracing::debug!(url = %page_url, error = %e, "Readability extraction failed");
        ProxyError::ParseFailed("Could not extract readable content".to_owned())
    })?;

    let text_content = product.text.trim().to_owned();
    if text_content.is_empty() {
        tracing::debug!(url = %page_url, "Extracted article has no text");
        return Err(ProxyError::ParseFailed(
            "No readable content found on the page".to_owned(),
        ));
    }

    let title = Some(collapse_whitespace(&product.title))
        .filter(|t| !t.is_empty())
        .or(details.metadata.title);

    let excerpt = details.social_description.or_else(|| {
        let flat = collapse_whitespace(&text_content);
        Some(truncate_chars(&flat, EXCERPT_CHARS).into_owned())
    });

    Ok(Article {
        title,
        byline: details.author,
        site_name: details.metadata.site_name,
        excerpt,
        length: text_content.chars().count(),
        html_content: sanitize(&product.content, page_url),
        text_content,
        image: details.images.og_image,
    })
}
