//! Content extraction and link discovery
//!
//! Pure transforms over rendered HTML: noise removal, same-origin link
//! discovery, and assembly of the final snapshot text.

use crate::state::{CrawlTask, CrawlerState};
use crate::url::{normalize_parsed, resolve_link, NormalizedKey, Origin};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// The captured state of one successfully rendered page
///
/// Handed to the output sink once and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    /// URL the page was requested as
    pub url: String,

    /// Canonical key of the page
    pub key: NormalizedKey,

    /// Cleaned main document followed by any captured iframes
    pub html: String,

    /// Same-origin links first discovered on this page
    pub discovered_links: Vec<NormalizedKey>,

    /// Elements opened by the expander
    pub expanded_count: usize,
}

/// A same-origin link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: String,
    pub key: NormalizedKey,
}

/// Removes every element matching a noise selector
///
/// Selectors that do not parse are ignored.
///
/// # Examples
///
/// ```
/// use unfurl::crawler::clean_html;
///
/// let html = r#"<html><body><div class="modal">Sign up!</div><p>Docs</p></body></html>"#;
/// let cleaned = clean_html(html, &[".modal".to_string()]);
/// assert!(cleaned.contains("Docs"));
/// assert!(!cleaned.contains("Sign up!"));
/// ```
pub fn clean_html(html: &str, noise_selectors: &[String]) -> String {
    let mut document = Html::parse_document(html);

    let selectors: Vec<Selector> = noise_selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect();

    let noise: Vec<_> = selectors
        .iter()
        .flat_map(|selector| document.select(selector).map(|el| el.id()))
        .collect();

    for id in &noise {
        if let Some(mut node) = document.tree.get_mut(*id) {
            node.detach();
        }
    }

    if !noise.is_empty() {
        tracing::trace!("Removed {} noise element(s)", noise.len());
    }
    document.html()
}

/// Finds the same-origin links on a page, in document order
///
/// Links are resolved against `page_url`, filtered to `origin`, normalized,
/// and deduplicated within the page.
pub fn discover_links(html: &str, page_url: &Url, origin: &Origin) -> Vec<DiscoveredLink> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let href = match element.value().attr("href") {
            Some(href) => href,
            None => continue,
        };
        let resolved = match resolve_link(href, page_url) {
            Some(url) => url,
            None => continue,
        };
        if !origin.contains(&resolved) {
            tracing::trace!("Discarding cross-origin link {}", resolved);
            continue;
        }
        let url = resolved.to_string();
        if let Ok(key) = normalize_parsed(resolved) {
            if seen.insert(key.clone()) {
                links.push(DiscoveredLink { url, key });
            }
        }
    }

    links
}

/// Pushes discovered links onto the frontier
///
/// Returns the keys that were actually queued, i.e. the links that were
/// neither visited, queued, nor in flight.
pub fn enqueue_discovered(
    state: &mut CrawlerState,
    parent: &NormalizedKey,
    links: Vec<DiscoveredLink>,
) -> Vec<NormalizedKey> {
    links
        .into_iter()
        .filter_map(|link| {
            let key = link.key.clone();
            state
                .push(CrawlTask::discovered(&link.url, link.key, parent))
                .then_some(key)
        })
        .collect()
}

/// Joins the main document and captured iframes into one snapshot body
pub fn assemble_snapshot(main: String, frames: &[String]) -> String {
    let mut html = main;
    for (i, frame) in frames.iter().enumerate() {
        html.push_str(&format!("\n<!-- IFRAME {} -->\n", i + 1));
        html.push_str(frame);
    }
    html
}
