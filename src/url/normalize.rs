use crate::UrlError;
use std::fmt;
use url::Url;

/// Canonical identity of a page
///
/// Two URLs with the same key are the same page and are crawled at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the key back into a URL
    pub fn to_url(&self) -> Result<Url, UrlError> {
        Url::parse(&self.0).map_err(|e| UrlError::Parse(e.to_string()))
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalizes a URL string into its [`NormalizedKey`]
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Remove the fragment (everything after #)
/// 3. Remove trailing slashes from the path (the root path stays `/`)
/// 4. Leave the query string untouched, parameter order included
///
/// The result is idempotent: normalizing a key yields the same key.
///
/// # Examples
///
/// ```
/// use unfurl::url::normalize_url;
///
/// let a = normalize_url("https://docs.example.com/a/#intro").unwrap();
/// let b = normalize_url("https://docs.example.com/a").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "https://docs.example.com/a");
/// ```
pub fn normalize_url(url_str: &str) -> Result<NormalizedKey, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already parsed URL
pub fn normalize_parsed(mut url: Url) -> Result<NormalizedKey, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    let trimmed = url.path().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        url.set_path("/");
    } else {
        url.set_path(&trimmed);
    }

    Ok(NormalizedKey(url.to_string()))
}
