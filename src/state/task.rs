use crate::url::{normalize_url, NormalizedKey};
use crate::UrlError;

/// A unit of crawl work
///
/// Created when a link is discovered or seeded. The attempt counter starts at
/// 1 and travels with the task every time it is pushed back onto the frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// The URL to navigate to, as it was discovered
    pub url: String,

    /// Canonical identity used for deduplication
    pub key: NormalizedKey,

    /// 1-based attempt number
    pub attempt: u32,

    /// Key of the page this link was discovered on (None for seeds)
    pub origin: Option<NormalizedKey>,

    /// Whether the one forced re-authentication retry has been spent
    pub reauth_used: bool,
}

impl CrawlTask {
    /// Creates a seed task with no parent
    pub fn seed(url: &str) -> Result<Self, UrlError> {
        let key = normalize_url(url)?;
        Ok(Self::with_key(url, key, None))
    }

    /// Creates a task discovered on another page
    pub fn discovered(url: &str, key: NormalizedKey, parent: &NormalizedKey) -> Self {
        Self::with_key(url, key, Some(parent.clone()))
    }

    fn with_key(url: &str, key: NormalizedKey, origin: Option<NormalizedKey>) -> Self {
        Self {
            url: url.trim().to_string(),
            key,
            attempt: 1,
            origin,
            reauth_used: false,
        }
    }

    /// Returns the task for the next transient-failure attempt
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }

    /// Returns the task for its forced re-authentication retry
    ///
    /// The attempt counter is left untouched: this retry is not counted
    /// against the normal budget.
    pub fn after_reauth(mut self) -> Self {
        self.reauth_used = true;
        self
    }
}
