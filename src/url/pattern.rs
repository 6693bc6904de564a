/// A set of URL fragments, any of which marks a URL as matching
///
/// Used for the post-login and sign-in surfaces, slow pages, and expansion
/// scope. Matching is a case-insensitive substring test.
///
/// # Examples
///
/// ```
/// use unfurl::url::UrlPattern;
///
/// let pattern = UrlPattern::new(["api-catalog", "dashboard"]);
/// assert!(pattern.matches("https://portal.example.com/Dashboard?tab=1"));
/// assert!(!pattern.matches("https://portal.example.com/sign-in"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlPattern {
    needles: Vec<String>,
}

impl UrlPattern {
    /// Creates a pattern from a list of substrings
    pub fn new<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            needles: needles
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Returns true if the pattern has no substrings
    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    /// Returns true if any substring occurs in the URL
    pub fn matches(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.needles.iter().any(|n| url.contains(n.as_str()))
    }

    /// Like [`matches`](Self::matches), but an empty pattern matches everything
    pub fn matches_or_empty(&self, url: &str) -> bool {
        self.is_empty() || self.matches(url)
    }
}
