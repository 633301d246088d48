//! Allow-list HTML sanitizer for extracted article content.
//!
//! The fragment is parsed with `scraper` and re-serialized node by node:
//!
//! - elements in [`DROPPED_TAGS`] vanish together with their subtree
//! - elements outside the allow-list are unwrapped (children kept in place)
//! - allowed elements keep only their per-tag attributes, with URLs made
//!   absolute and script-capable schemes removed
//! - comments and other non-content nodes are dropped
//!
//! Running the sanitizer on its own output returns the same string.

use scraper::{ElementRef, Html, Node};
use url::Url;

use crate::util::resolve_url;

/// Removed including all descendants.
pub const DROPPED_TAGS: &[&str] = &[
    "script", "style", "link", "meta", "iframe", "embed", "object", "form", "input", "button",
    "select", "textarea", "noscript", "template", "svg",
];

/// Elements that survive sanitization.
pub const ALLOWED_TAGS: &[&str] = &[
    // Headings and blocks
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "br", "hr", "blockquote", "pre", "div", "section",
    "article",
    // Lists
    "ul", "ol", "li", "dl", "dt", "dd",
    // Inline semantics
    "a", "code", "em", "strong", "b", "i", "u", "s", "sub", "sup", "small", "mark", "abbr",
    "cite", "q", "del", "ins", "span", "time",
    // Media
    "img", "figure", "figcaption", "picture", "source", "video", "audio",
    // Tables
    "table", "caption", "thead", "tbody", "tfoot", "tr", "th", "td",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img", "source"];

/// Schemes that can execute script when followed.
const SCRIPT_SCHEMES: &[&str] = &["javascript:", "vbscript:"];

fn allowed_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href"],
        "img" => &["src", "srcset", "alt", "title"],
        "source" => &["src", "srcset", "type", "media"],
        "video" => &["src", "poster", "controls", "width", "height"],
        "audio" => &["src", "controls"],
        "td" => &["colspan", "rowspan"],
        "th" => &["colspan", "rowspan", "scope"],
        "ol" => &["start"],
        "abbr" => &["title"],
        "time" => &["datetime"],
        _ => &[],
    }
}

/// Sanitizes `fragment`, resolving relative URLs against `base_url`.
///
/// # Examples
///
/// ```
/// use feedgate::content::sanitize;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/post").unwrap();
/// let out = sanitize(r#"<p onclick="x()">Hi <img src="/a.png"><script>evil()</script></p>"#, &base);
/// assert_eq!(out, r#"<p>Hi <img src="https://example.com/a.png"></p>"#);
/// ```
pub fn sanitize(fragment: &str, base_url: &Url) -> String {
    let doc = Html::parse_fragment(fragment);
    let mut out = String::with_capacity(fragment.len());
    write_children(doc.root_element(), base_url, &mut out);
    out
}

fn write_children(parent: ElementRef<'_>, base: &Url, out: &mut String) {
    for child in parent.children() {
        if let Some(element) = ElementRef::wrap(child) {
            write_element(element, base, out);
        } else if let Node::Text(text) = child.value() {
            escape_text(text, out);
        }
    }
}

fn write_element(node: ElementRef<'_>, base: &Url, out: &mut String) {
    let el = node.value();
    let tag = el.name();
    if DROPPED_TAGS.contains(&tag) {
        return;
    }
    if !ALLOWED_TAGS.contains(&tag) {
        write_children(node, base, out);
        return;
    }

    out.push('<');
    out.push_str(tag);
    for &name in allowed_attrs(tag) {
        let Some(value) = el.attr(name) else {
            continue;
        };
        let Some(value) = clean_attr(tag, name, value, base) else {
            continue;
        };
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(&value, out);
        out.push('"');
    }
    out.push('>');

    if VOID_TAGS.contains(&tag) {
        return;
    }

    let mut inner = String::new();
    write_children(node, base, &mut inner);
    // The parser swallows one newline right after <pre>.
    if tag == "pre" && inner.starts_with('\n') {
        out.push('\n');
    }
    out.push_str(&inner);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn clean_attr(tag: &str, name: &str, value: &str, base: &Url) -> Option<String> {
    match (tag, name) {
        ("a", "href") => clean_href(value, base),
        (_, "src") | (_, "poster") => clean_media_url(value, base),
        (_, "srcset") => clean_srcset(value, base),
        _ => Some(value.to_owned()),
    }
}

/// Lowercased value with whitespace and control characters removed, so that
/// `java\tscript:` and ` JAVASCRIPT:` are recognized.
fn scheme_probe(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_absolute_http(probe: &str) -> bool {
    probe.starts_with("http://") || probe.starts_with("https://")
}

fn clean_href(value: &str, base: &Url) -> Option<String> {
    let probe = scheme_probe(value);
    if probe.starts_with("data:") || SCRIPT_SCHEMES.iter().any(|s| probe.starts_with(s)) {
        return None;
    }
    let value = value.trim();
    if is_absolute_http(&probe) || probe.starts_with("mailto:") || value.starts_with('#') {
        return Some(value.to_owned());
    }
    Some(resolve_url(value, base).unwrap_or_else(|| value.to_owned()))
}

fn clean_media_url(value: &str, base: &Url) -> Option<String> {
    let probe = scheme_probe(value);
    if probe.starts_with("data:") {
        return Some(value.to_owned());
    }
    if SCRIPT_SCHEMES.iter().any(|s| probe.starts_with(s)) {
        return None;
    }
    let value = value.trim();
    if is_absolute_http(&probe) {
        return Some(value.to_owned());
    }
    Some(resolve_url(value, base).unwrap_or_else(|| value.to_owned()))
}

/// Splits a srcset list into `(url, descriptors)` candidates. A URL runs to
/// the next whitespace, so commas inside `data:` URLs stay put; descriptors
/// run to the next comma outside parentheses.
fn srcset_candidates(value: &str) -> Vec<(&str, &str)> {
    let mut candidates = Vec::new();
    let mut rest = value;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        if rest.is_empty() {
            return candidates;
        }

        let url_end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let (url, after) = rest.split_at(url_end);
        let bare = url.trim_end_matches(',');
        if bare.len() != url.len() {
            candidates.push((bare, ""));
            rest = after;
            continue;
        }

        let mut depth = 0u32;
        let mut end = after.len();
        for (i, c) in after.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }
        candidates.push((url, after[..end].trim()));
        rest = &after[end..];
    }
}

/// Rewrites each `url descriptor` entry of a srcset list.
fn clean_srcset(value: &str, base: &Url) -> Option<String> {
    let entries: Vec<String> = srcset_candidates(value)
        .into_iter()
        .filter_map(|(url, descriptors)| {
            let url = clean_media_url(url, base)?;
            let descriptors: Vec<&str> = descriptors.split_ascii_whitespace().collect();
            if descriptors.is_empty() {
                Some(url)
            } else {
                Some(format!("{url} {}", descriptors.join(" ")))
            }
        })
        .collect();

    (!entries.is_empty()).then(|| entries.join(", "))
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> Url {
        Url::parse("https://example.com/post").unwrap()
    }

    fn clean(html: &str) -> String {
        sanitize(html, &base())
    }

    #[test]
    fn test_dangerous_elements_removed_with_content() {
        let out = clean(
            "<p>keep</p><script>alert(1)</script><style>p{}</style>\
             <iframe src=\"https://evil.com\"></iframe><form><input value=\"x\"><p>in form</p></form>\
             <svg><circle/></svg><noscript>ns</noscript><template><p>t</p></template>",
        );
        assert_eq!(out, "<p>keep</p>");
    }

    #[test]
    fn test_unknown_elements_unwrapped() {
        let out = clean("<font color=\"red\"><b>bold</b> text</font><center>mid</center>");
        assert_eq!(out, "<b>bold</b> textmid");
    }

    #[test]
    fn test_unwrap_keeps_nesting_order() {
        let out = clean("<div class=\"x\"><custom-el><p>one</p><p>two</p></custom-el></div>");
        assert_eq!(out, "<div><p>one</p><p>two</p></div>");
    }

    #[test]
    fn test_attributes_filtered_per_tag() {
        let out = clean(
            "<p style=\"color:red\" id=\"x\">p</p>\
             <a href=\"https://x.com\" onclick=\"steal()\" target=\"_blank\">a</a>\
             <img src=\"https://x.com/i.png\" alt=\"A\" title=\"T\" onerror=\"e()\" width=\"10\">",
        );
        assert_eq!(
            out,
            "<p>p</p><a href=\"https://x.com\">a</a>\
             <img src=\"https://x.com/i.png\" alt=\"A\" title=\"T\">"
        );
    }

    #[test]
    fn test_javascript_href_removed_element_kept() {
        assert_eq!(
            clean("<a href=\"javascript:alert(1)\">click</a>"),
            "<a>click</a>"
        );
        assert_eq!(clean("<a href=\" JaVaScRiPt:alert(1)\">x</a>"), "<a>x</a>");
        assert_eq!(clean("<a href=\"java\tscript:alert(1)\">x</a>"), "<a>x</a>");
        assert_eq!(clean("<a href=\"vbscript:msgbox\">x</a>"), "<a>x</a>");
        assert_eq!(
            clean("<a href=\"data:text/html,<script>alert(1)</script>\">x</a>"),
            "<a>x</a>"
        );
    }

    #[test]
    fn test_href_resolution() {
        assert_eq!(
            clean("<a href=\"/about\">x</a>"),
            "<a href=\"https://example.com/about\">x</a>"
        );
        assert_eq!(
            clean("<a href=\"other\">x</a>"),
            "<a href=\"https://example.com/other\">x</a>"
        );
        assert_eq!(clean("<a href=\"#top\">x</a>"), "<a href=\"#top\">x</a>");
        assert_eq!(
            clean("<a href=\"mailto:a@example.com\">x</a>"),
            "<a href=\"mailto:a@example.com\">x</a>"
        );
        assert_eq!(
            clean("<a href=\"http://other.com/p?a=1&amp;b=2\">x</a>"),
            "<a href=\"http://other.com/p?a=1&amp;b=2\">x</a>"
        );
    }

    #[test]
    fn test_relative_src_resolved() {
        assert_eq!(
            clean("<img src=\"/img.png\">"),
            "<img src=\"https://example.com/img.png\">"
        );
    }

    #[test]
    fn test_data_src_preserved_script_src_dropped() {
        assert_eq!(
            clean("<img src=\"data:image/png;base64,AAAA\">"),
            "<img src=\"data:image/png;base64,AAAA\">"
        );
        assert_eq!(clean("<img src=\"javascript:alert(1)\" alt=\"a\">"), "<img alt=\"a\">");
    }

    #[test]
    fn test_srcset_entries_resolved() {
        assert_eq!(
            clean("<img srcset=\"/a.png 1x, b.png 2x,https://cdn.com/c.png 640w\">"),
            "<img srcset=\"https://example.com/a.png 1x, https://example.com/b.png 2x, https://cdn.com/c.png 640w\">"
        );
    }

    #[test]
    fn test_srcset_keeps_data_urls_whole() {
        assert_eq!(
            clean("<img srcset=\"/a.png 1x, data:image/png;base64,AAAA 2x\">"),
            "<img srcset=\"https://example.com/a.png 1x, data:image/png;base64,AAAA 2x\">"
        );
        assert_eq!(
            clean("<img srcset=\"data:image/png;base64,AAAA 1x, /b.png 2x\">"),
            "<img srcset=\"data:image/png;base64,AAAA 1x, https://example.com/b.png 2x\">"
        );
    }

    #[test]
    fn test_srcset_candidates() {
        assert_eq!(
            srcset_candidates("a.png, b.png 2x,c.png 100w (x, y), data:x,y"),
            vec![
                ("a.png", ""),
                ("b.png", "2x"),
                ("c.png", "100w (x, y)"),
                ("data:x,y", ""),
            ]
        );
        assert!(srcset_candidates(" , ").is_empty());
    }

    #[test]
    fn test_video_and_source() {
        let out = clean(
            "<video poster=\"/p.jpg\" controls autoplay><source src=\"v.mp4\" type=\"video/mp4\" onload=\"x\"></video>",
        );
        assert_eq!(
            out,
            "<video poster=\"https://example.com/p.jpg\" controls=\"\">\
             <source src=\"https://example.com/v.mp4\" type=\"video/mp4\"></video>"
        );
    }

    #[test]
    fn test_table_cells_keep_span_attributes() {
        let out = clean(
            "<table><tr><th scope=\"col\" class=\"h\">H</th><td colspan=\"2\" bgcolor=\"red\">D</td></tr></table>",
        );
        assert_eq!(
            out,
            "<table><tbody><tr><th scope=\"col\">H</th><td colspan=\"2\">D</td></tr></tbody></table>"
        );
    }

    #[test]
    fn test_text_escaped_and_comments_dropped() {
        assert_eq!(
            clean("<p>1 &lt; 2 &amp; 3 &gt; 2<!-- secret --></p>"),
            "<p>1 &lt; 2 &amp; 3 &gt; 2</p>"
        );
    }

    #[test]
    fn test_attribute_quotes_escaped() {
        assert_eq!(
            clean("<img alt='say \"hi\"'>"),
            "<img alt=\"say &quot;hi&quot;\">"
        );
    }

    #[test]
    fn test_pre_leading_newline_preserved() {
        let html = "<pre>\n\nindented</pre>";
        let once = clean(html);
        assert_eq!(once, "<pre>\n\nindented</pre>");
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "<div><p>Hello <a href=\"/x\">world</a></p><img src=\"i.png\" srcset=\"a.png 1x, b.png 2x\"></div>",
            "<table><tr><td>1</td></tr></table><ul><li>a<li>b</ul>",
            "<font><p>one<p>two</font><script>x</script>",
            "<p>a &amp; b &lt;c&gt; &nbsp;d</p><!-- c --><pre>\ncode\n</pre>",
            "<a href=\"javascript:void(0)\">x</a><a href=\"#frag\">y</a><img src=\"data:image/gif;base64,R0lG\">",
            "<blockquote><custom><h2>t</h2></custom>text</blockquote>",
            "plain text with <b>bold</b> and <unknown>unwrapped</unknown>",
        ];
        for sample in samples {
            let once = clean(sample);
            let twice = clean(&once);
            assert_eq!(twice, once, "not idempotent for {sample}");
        }
    }
}
