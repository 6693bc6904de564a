use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Unfurl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    pub origin: OriginConfig,
    #[serde(default)]
    pub session: Option<SessionConfig>,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// The URL that defines the crawl's origin: `start-url`, else the first seed
    pub fn start_url(&self) -> Option<&str> {
        self.origin
            .start_url
            .as_deref()
            .or_else(|| self.origin.seeds.first().map(String::as_str))
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of independent (session, driver) workers
    pub workers: usize,

    /// Attempts per task before a transient failure becomes permanent
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Fixed delay before a failed task is retried (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Readiness timeout for ordinary pages (seconds)
    #[serde(rename = "page-timeout-secs")]
    pub page_timeout_secs: u64,

    /// Readiness timeout for pages matching `slow-page-patterns` (seconds)
    #[serde(rename = "slow-page-timeout-secs")]
    pub slow_page_timeout_secs: u64,

    /// URL substrings that mark a page as slow to render
    #[serde(rename = "slow-page-patterns")]
    pub slow_page_patterns: Vec<String>,

    /// Extra pause after a slow page reports ready (milliseconds)
    #[serde(rename = "slow-page-settle-ms")]
    pub slow_page_settle_ms: u64,

    /// Period between predicate checks while waiting (milliseconds)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Selector for the consent / cookie prompt's accept button
    #[serde(rename = "consent-selector")]
    pub consent_selector: String,

    /// How long to look for the consent prompt (seconds)
    #[serde(rename = "consent-timeout-secs")]
    pub consent_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_attempts: 3,
            retry_delay_ms: 2000,
            page_timeout_secs: 10,
            slow_page_timeout_secs: 40,
            slow_page_patterns: vec!["documentation".to_string()],
            slow_page_settle_ms: 3000,
            poll_interval_ms: 100,
            consent_selector: "button[id*='accept'], button[class*='cookie-accept']".to_string(),
            consent_timeout_secs: 5,
        }
    }
}

impl CrawlerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn slow_page_timeout(&self) -> Duration {
        Duration::from_secs(self.slow_page_timeout_secs)
    }

    pub fn slow_page_settle(&self) -> Duration {
        Duration::from_millis(self.slow_page_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.consent_timeout_secs)
    }
}

/// Which render driver the workers use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Headless Chrome over the DevTools protocol
    Chrome,
    /// Plain HTTP fetches without script execution
    Http,
}

/// Render driver configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub kind: DriverKind,

    /// Chrome or Chromium binary (searched for on the system when unset)
    pub executable: Option<String>,

    pub headless: bool,

    /// Passes `--no-sandbox`, needed when running as root in a container
    #[serde(rename = "no-sandbox")]
    pub no_sandbox: bool,

    /// Directory holding one browser profile per worker (a temporary
    /// directory, removed on exit, when unset)
    #[serde(rename = "profile-root")]
    pub profile_root: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            kind: DriverKind::Chrome,
            executable: None,
            headless: true,
            no_sandbox: false,
            profile_root: None,
        }
    }
}

impl DriverConfig {
    /// Profile directory for one worker's browser
    pub fn profile_dir(&self, worker_id: usize) -> PathBuf {
        match &self.profile_root {
            Some(root) => PathBuf::from(root).join(format!("worker-{}", worker_id)),
            None => std::env::temp_dir().join(format!(
                "unfurl-{}-worker-{}",
                std::process::id(),
                worker_id
            )),
        }
    }
}

/// Where the crawl starts and what counts as same-origin
#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    /// URLs that prime the frontier
    pub seeds: Vec<String>,

    /// URL whose host defines the origin (defaults to the first seed)
    #[serde(rename = "start-url", default)]
    pub start_url: Option<String>,

    /// Whether the port is part of the origin
    #[serde(rename = "include-port", default)]
    pub include_port: bool,

    /// Whether discovered links are followed (false crawls the seeds only)
    #[serde(rename = "follow-links", default = "default_true")]
    pub follow_links: bool,
}

/// Login flow and session-expiry detection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Page that presents the login form
    #[serde(rename = "login-url")]
    pub login_url: String,

    /// URL substrings that mean the login succeeded
    #[serde(rename = "post-login-patterns")]
    pub post_login_patterns: Vec<String>,

    /// URL substrings that mean the session has expired
    #[serde(rename = "sign-in-patterns")]
    pub sign_in_patterns: Vec<String>,

    #[serde(rename = "identity-selector")]
    pub identity_selector: String,

    #[serde(rename = "secret-selector")]
    pub secret_selector: String,

    #[serde(rename = "submit-selector")]
    pub submit_selector: String,

    /// How long to wait for the identity field (seconds)
    #[serde(rename = "field-timeout-secs")]
    pub field_timeout_secs: u64,

    /// How long to wait for a post-login URL after submitting (seconds)
    #[serde(rename = "login-timeout-secs")]
    pub login_timeout_secs: u64,

    /// Pause after a successful login (milliseconds)
    #[serde(rename = "post-login-settle-ms")]
    pub post_login_settle_ms: u64,

    /// Environment variable holding the login identity
    #[serde(rename = "identity-env")]
    pub identity_env: String,

    /// Environment variable holding the login secret
    #[serde(rename = "secret-env")]
    pub secret_env: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            post_login_patterns: vec!["api-catalog".to_string(), "dashboard".to_string()],
            sign_in_patterns: vec!["sign-in".to_string()],
            identity_selector: "input[type='email']".to_string(),
            secret_selector: "input[type='password']".to_string(),
            submit_selector: "button[type='submit']".to_string(),
            field_timeout_secs: 20,
            login_timeout_secs: 60,
            post_login_settle_ms: 2000,
            identity_env: "UNFURL_IDENTITY".to_string(),
            secret_env: "UNFURL_SECRET".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn field_timeout(&self) -> Duration {
        Duration::from_secs(self.field_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn post_login_settle(&self) -> Duration {
        Duration::from_millis(self.post_login_settle_ms)
    }
}

/// Dynamic content expansion
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Selectors for collapsed controls, most specific first
    pub selectors: Vec<String>,

    /// Upper bound on expansion rounds
    #[serde(rename = "max-rounds")]
    pub max_rounds: u32,

    /// Pause after each click (milliseconds)
    #[serde(rename = "click-pause-ms")]
    pub click_pause_ms: u64,

    /// Pause between rounds (milliseconds)
    #[serde(rename = "round-settle-ms")]
    pub round_settle_ms: u64,

    /// Pause after the last round (milliseconds)
    #[serde(rename = "final-settle-ms")]
    pub final_settle_ms: u64,

    /// Whether to run the script-level sweep after the rounds
    #[serde(rename = "final-sweep")]
    pub final_sweep: bool,

    /// URL substrings of pages to expand (empty expands every page)
    #[serde(rename = "url-patterns")]
    pub url_patterns: Vec<String>,

    /// Whether to click "Try it out" buttons before capture
    #[serde(rename = "try-it-out")]
    pub try_it_out: bool,

    #[serde(rename = "try-it-out-selector")]
    pub try_it_out_selector: String,

    /// How long to wait for an iframe's body (seconds)
    #[serde(rename = "frame-timeout-secs")]
    pub frame_timeout_secs: u64,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            selectors: vec![
                ".opblock-summary-control".to_string(),
                ".model-box-control".to_string(),
                "[aria-expanded='false']".to_string(),
                ".toggle-arrow".to_string(),
                ".collapsible-control".to_string(),
            ],
            max_rounds: 3,
            click_pause_ms: 200,
            round_settle_ms: 1000,
            final_settle_ms: 2000,
            final_sweep: true,
            url_patterns: Vec::new(),
            try_it_out: false,
            try_it_out_selector: "button.try-out__btn".to_string(),
            frame_timeout_secs: 5,
        }
    }
}

impl ExpansionConfig {
    pub fn click_pause(&self) -> Duration {
        Duration::from_millis(self.click_pause_ms)
    }

    pub fn round_settle(&self) -> Duration {
        Duration::from_millis(self.round_settle_ms)
    }

    pub fn final_settle(&self) -> Duration {
        Duration::from_millis(self.final_settle_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_secs)
    }
}

/// Noise removal before capture
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Elements matching any of these selectors are removed from snapshots
    #[serde(rename = "noise-selectors")]
    pub noise_selectors: Vec<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            noise_selectors: [
                ".modal",
                ".modal-dialog",
                ".cookie-banner",
                ".recaptcha",
                ".overlay",
                ".consent",
                ".advertisement",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory that receives the page files
    pub directory: String,

    /// Whether to write `index.html` after the crawl
    #[serde(rename = "write-index")]
    pub write_index: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "pages".to_string(),
            write_index: true,
        }
    }
}

fn default_true() -> bool {
    true
}
