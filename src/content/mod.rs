//! Untrusted page content: sanitization, metadata and article extraction.
//!
//! All functions here are synchronous and return owned data; parsed
//! documents never outlive the call that created them.

mod article;
mod page;
mod sanitize;

pub use article::{extract_article, Article};
pub use page::{inspect_page, PageDetails, PageImages, PageMetadata};
pub use sanitize::{sanitize, ALLOWED_TAGS, DROPPED_TAGS};
