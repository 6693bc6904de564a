use crate::UrlError;
use url::Url;

/// The network location a crawl is confined to
///
/// Links whose host differs from the origin are discarded before they ever
/// become tasks. The port is only compared when `include_port` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    host: String,
    port: Option<u16>,
    include_port: bool,
}

impl Origin {
    /// Builds the origin from the crawl's starting URL
    ///
    /// # Examples
    ///
    /// ```
    /// use unfurl::url::Origin;
    /// use url::Url;
    ///
    /// let origin = Origin::from_start_url("https://Docs.Example.com/start", false).unwrap();
    /// assert_eq!(origin.host(), "docs.example.com");
    /// assert!(origin.contains(&Url::parse("https://docs.example.com:8443/x").unwrap()));
    /// ```
    pub fn from_start_url(start_url: &str, include_port: bool) -> Result<Self, UrlError> {
        let url = Url::parse(start_url).map_err(|e| UrlError::Parse(e.to_string()))?;
        let host = extract_host(&url).ok_or(UrlError::MissingHost)?;

        Ok(Self {
            host,
            port: url.port_or_known_default(),
            include_port,
        })
    }

    /// Returns the lowercase host of this origin
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Tests whether a URL shares this origin's network location
    pub fn contains(&self, url: &Url) -> bool {
        match extract_host(url) {
            Some(host) if host == self.host => {
                !self.include_port || url.port_or_known_default() == self.port
            }
            _ => false,
        }
    }
}

/// Extracts the lowercase host from a URL
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
