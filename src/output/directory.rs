//! Directory output sink
//!
//! Writes each page to `<root>/<category>/scraped_<path>_<hash>.html`, where
//! the category is `api`, `documentation` or `misc` depending on the URL
//! path and the hash is the first six hex digits of SHA-256 of the URL.

use crate::output::index::format_index;
use crate::output::traits::{OutputError, OutputResult, OutputSink, StoredPage};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use url::Url;

const MAX_STEM_LEN: usize = 100;

/// Stores pages as files under a root directory
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    stored: Mutex<Vec<StoredPage>>,
}

impl DirectorySink {
    /// Creates the sink, creating `root` if needed
    pub fn new(root: impl Into<PathBuf>) -> OutputResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            stored: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pages stored so far, in store order
    pub fn stored(&self) -> Vec<StoredPage> {
        self.stored
            .lock()
            .map(|stored| stored.clone())
            .unwrap_or_default()
    }

    /// Writes `index.html` linking every stored page
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Path of the written index
    /// * `Err(OutputError)` - The file could not be written
    pub fn write_index(&self) -> OutputResult<PathBuf> {
        let pages = self.stored();
        let html = format_index(&pages, Utc::now());
        let path = self.root.join("index.html");
        std::fs::write(&path, html)?;
        tracing::info!("Index written to {} ({} pages)", path.display(), pages.len());
        Ok(path)
    }
}

impl OutputSink for DirectorySink {
    fn store(&self, url: &str, html: &str) -> OutputResult<String> {
        let relative = relative_path_for(url);
        let path = self.root.join(&relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, html)?;

        let location = relative.to_string_lossy().replace('\\', "/");
        tracing::debug!("Stored {} as {}", url, location);

        self.stored
            .lock()
            .map_err(|_| OutputError::Write("stored page list poisoned".to_string()))?
            .push(StoredPage {
                url: url.to_string(),
                location: location.clone(),
                stored_at: Utc::now(),
            });

        Ok(location)
    }
}

/// Category sub-directory for a sanitised path
fn category(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.contains("api") {
        "api"
    } else if lower.contains("documentation") {
        "documentation"
    } else {
        "misc"
    }
}

/// Relative file path for a URL: `<category>/scraped_<stem>_<hash>.html`
pub fn relative_path_for(url: &str) -> PathBuf {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let path = path.trim_matches('/').replace('/', "_");
    let path = if path.is_empty() {
        "index".to_string()
    } else {
        path
    };

    let stem: String = path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let file_name = format!("scraped_{}_{}.html", stem, &digest[..6]);

    PathBuf::from(category(&path)).join(file_name)
}
