//! URL handling module
//!
//! This module provides URL normalization, the same-origin test, and the
//! substring patterns used to recognise sign-in and post-login surfaces.

mod normalize;
mod origin;
mod pattern;

// Re-export main functions
pub use normalize::{normalize_parsed, normalize_url, NormalizedKey};
pub use origin::{extract_host, Origin};
pub use pattern::UrlPattern;

use url::Url;

/// Resolves a hyperlink reference against the page it appears on
///
/// Returns None for empty, fragment-only, `mailto:`, `javascript:`, `tel:`
/// and `data:` references, and for anything that does not resolve to an
/// HTTP(S) URL.
///
/// # Examples
///
/// ```
/// use unfurl::url::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://docs.example.com/guide/intro").unwrap();
/// let resolved = resolve_link("../api", &base).unwrap();
/// assert_eq!(resolved.as_str(), "https://docs.example.com/api");
/// assert!(resolve_link("mailto:team@example.com", &base).is_none());
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute)
        }
        _ => None,
    }
}
