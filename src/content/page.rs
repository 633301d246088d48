//! Metadata read from a page's `<head>`.

use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use crate::feed::discovery::document_base;
use crate::util::{collapse_whitespace, resolve_url, strip_control_chars};

/// Descriptive metadata reported by `/discover`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub language: Option<String>,
}

/// Site imagery reported by `/discover`. URLs are absolute.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PageImages {
    pub og_image: Option<String>,
    pub favicon: Option<String>,
}

/// Everything read from one parse of a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDetails {
    pub metadata: PageMetadata,
    pub images: PageImages,
    pub author: Option<String>,
    /// `og:description` when present, else the plain description meta.
    pub social_description: Option<String>,
}

const TITLE_SELECTORS: &[&str] = &["meta[property='og:title']", "meta[name='twitter:title']"];
const DESCRIPTION_SELECTORS: &[&str] = &[
    "meta[name='description']",
    "meta[property='og:description']",
    "meta[name='twitter:description']",
];
const SOCIAL_DESCRIPTION_SELECTORS: &[&str] = &[
    "meta[property='og:description']",
    "meta[name='description']",
];
const SITE_NAME_SELECTORS: &[&str] = &[
    "meta[property='og:site_name']",
    "meta[name='application-name']",
];
const AUTHOR_SELECTORS: &[&str] = &[
    "meta[name='author']",
    "meta[property='article:author']",
    "meta[name='twitter:creator']",
];
const IMAGE_SELECTORS: &[&str] = &[
    "meta[property='og:image']",
    "meta[property='og:image:url']",
    "meta[name='twitter:image']",
];
const ICON_SELECTORS: &[&str] = &[
    "link[rel~='icon']",
    "link[rel='shortcut icon']",
    "link[rel='apple-touch-icon']",
];

/// Parses `html` once and reads title, description, site name, language,
/// author and images. Image URLs resolve against the document base.
pub fn inspect_page(html: &str, page_url: &Url) -> PageDetails {
    let doc = Html::parse_document(html);
    let base = document_base(&doc, page_url);

    let title = first_meta(&doc, TITLE_SELECTORS).or_else(|| element_text(&doc, "title"));

    let metadata = PageMetadata {
        title,
        description: first_meta(&doc, DESCRIPTION_SELECTORS),
        site_name: first_meta(&doc, SITE_NAME_SELECTORS),
        language: language(&doc),
    };

    let images = PageImages {
        og_image: first_meta(&doc, IMAGE_SELECTORS).and_then(|src| image_url(&src, &base)),
        favicon: first_attr(&doc, ICON_SELECTORS, "href").and_then(|href| image_url(&href, &base)),
    };

    PageDetails {
        metadata,
        images,
        author: first_meta(&doc, AUTHOR_SELECTORS)
            .or_else(|| element_text(&doc, "[rel='author']")),
        social_description: first_meta(&doc, SOCIAL_DESCRIPTION_SELECTORS),
    }
}

/// Resolved image URL; only `http(s):` and `data:` survive.
fn image_url(raw: &str, base: &Url) -> Option<String> {
    let resolved = resolve_url(raw, base)?;
    let scheme = Url::parse(&resolved).ok()?.scheme().to_owned();
    matches!(scheme.as_str(), "http" | "https" | "data").then_some(resolved)
}

fn clean(value: &str) -> Option<String> {
    let value = collapse_whitespace(&strip_control_chars(value));
    (!value.is_empty()).then_some(value)
}

fn first_attr(doc: &Html, selectors: &[&str], attr: &str) -> Option<String> {
    selectors.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        doc.select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .find_map(clean)
    })
}

fn first_meta(doc: &Html, selectors: &[&str]) -> Option<String> {
    first_attr(doc, selectors, "content")
}

fn element_text(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector)
        .map(|el| el.text().collect::<String>())
        .find_map(|text| clean(&text))
}

/// `<html lang>`, then `og:locale`, reduced to the primary subtag.
fn language(doc: &Html) -> Option<String> {
    first_attr(doc, &["html"], "lang")
        .or_else(|| first_meta(doc, &["meta[property='og:locale']", "meta[http-equiv='content-language']"]))
        .and_then(|lang| {
            let primary = lang.split(['-', '_']).next()?.trim().to_ascii_lowercase();
            (!primary.is_empty()).then_some(primary)
        })
}
