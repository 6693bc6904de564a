//! Output sink trait and types
//!
//! The crawler hands every successful snapshot to exactly one
//! [`OutputSink::store`] call. What a "location" means is up to the sink.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receives page snapshots
///
/// Shared by all workers, so implementations must be thread-safe.
pub trait OutputSink: Send + Sync {
    /// Stores one page and returns where it went
    ///
    /// # Arguments
    ///
    /// * `url` - The page's URL
    /// * `html` - The snapshot body
    fn store(&self, url: &str, html: &str) -> OutputResult<String>;
}

/// A page a sink has stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPage {
    pub url: String,
    pub location: String,
    pub stored_at: DateTime<Utc>,
}

/// Keeps snapshots in memory
///
/// Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pages: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored `(url, html)` pair in store order
    pub fn pages(&self) -> Vec<(String, String)> {
        self.pages
            .lock()
            .map(|pages| pages.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.pages.lock().map(|pages| pages.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn urls(&self) -> Vec<String> {
        self.pages().into_iter().map(|(url, _)| url).collect()
    }
}

impl OutputSink for MemorySink {
    fn store(&self, url: &str, html: &str) -> OutputResult<String> {
        let mut pages = self
            .pages
            .lock()
            .map_err(|_| OutputError::Write("memory sink poisoned".to_string()))?;
        pages.push((url.to_string(), html.to_string()));
        Ok(format!("memory:{}", pages.len() - 1))
    }
}
