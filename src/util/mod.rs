//! Utility functions for common operations.
//!
//! - **URL validation**: the SSRF gate every outbound request passes through
//! - **Text processing**: control-character stripping and excerpt helpers
//! - **URL resolution**: relative-to-absolute resolution shared by discovery
//!   and sanitization
//!
//! # Examples
//!
//! ```
//! use feedgate::util::{resolve_url, UrlSafetyValidator};
//!
//! let validator = UrlSafetyValidator::default();
//! assert!(validator.validate("https://example.com/feed.xml").is_ok());
//!
//! let base = url::Url::parse("https://example.com/blog/").unwrap();
//! assert_eq!(resolve_url("feed.xml", &base).as_deref(), Some("https://example.com/blog/feed.xml"));
//! ```

mod text;
mod url_validator;

pub use text::{collapse_whitespace, strip_control_chars, truncate_chars};
pub use url_validator::{UrlSafetyValidator, UrlValidationError};

/// Resolves a possibly relative reference against `base`.
///
/// Protocol-relative references (`//host/path`) inherit the base scheme.
/// Returns `None` when the reference cannot be joined.
pub fn resolve_url(href: &str, base: &url::Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}
