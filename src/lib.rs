//! Unfurl: an authenticated crawler for client-rendered documentation sites
//!
//! This crate walks the link graph of a documentation portal through a
//! [`driver::RenderDriver`], logs in when the portal asks for it, opens every
//! collapsed panel before capturing the page, and hands a cleaned snapshot of
//! each page to an [`output::OutputSink`].

pub mod config;
pub mod crawler;
pub mod driver;
pub mod output;
pub mod session;
pub mod state;
pub mod url;

use thiserror::Error;

pub use crawler::FailureKind;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("Driver failure: {0}")]
    DriverFailure(String),

    #[error("Stale element reference")]
    StaleElement,

    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Render failed: {0}")]
    UnknownRender(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Classifies this error for the retry controller
    ///
    /// Anything outside the render taxonomy (bad URLs, configuration, I/O)
    /// is an unknown render error and therefore fatal for the task.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NavigationTimeout(_) => FailureKind::NavigationTimeout,
            Self::DriverFailure(_) => FailureKind::DriverFailure,
            Self::StaleElement => FailureKind::StaleElement,
            Self::AuthenticationFailure(_) => FailureKind::AuthenticationFailure,
            Self::UnknownRender(_)
            | Self::Config(_)
            | Self::Url(_)
            | Self::Output(_)
            | Self::Io(_) => FailureKind::UnknownRender,
        }
    }
}

impl From<driver::DriverError> for CrawlError {
    fn from(err: driver::DriverError) -> Self {
        use driver::DriverError;

        match err {
            DriverError::Timeout(msg) => Self::NavigationTimeout(msg),
            DriverError::Transport(msg) => Self::DriverFailure(msg),
            DriverError::StaleElement => Self::StaleElement,
            DriverError::HttpStatus { url, status } if status >= 500 => {
                Self::DriverFailure(format!("HTTP {} from {}", status, url))
            }
            other => Self::UnknownRender(other.to_string()),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlResult, Orchestrator, PageSnapshot, Worker};
pub use driver::{ChromeDriver, HttpDriver, RenderDriver};
pub use session::{Credentials, SessionManager, SessionState};
pub use state::{CrawlTask, CrawlerState};
pub use crate::url::{normalize_url, NormalizedKey, Origin};
