//! Session management
//!
//! One [`SessionManager`] per worker owns that worker's authentication
//! state:
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated -> Expired -> Authenticating ...
//!                          |
//!                          +-> Unauthenticated (login failed)
//! ```
//!
//! A manager built without a `[session]` table is anonymous: it is
//! authenticated from the start and never sees a sign-in redirect.

mod credentials;

pub use credentials::{CredentialProvider, Credentials, EnvCredentials, StaticCredentials};

use crate::config::{Config, CrawlerConfig, SessionConfig};
use crate::driver::{dismiss_consent, wait_for, Condition, DriverError, RenderDriver, WaitOutcome};
use crate::url::UrlPattern;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Authentication state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Expired,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Everything needed to log in
#[derive(Debug, Clone)]
struct LoginFlow {
    config: SessionConfig,
    credentials: Credentials,
    post_login: UrlPattern,
    consent_selector: String,
    consent_timeout: Duration,
    poll_interval: Duration,
}

/// Owns the login state machine for one worker
#[derive(Debug)]
pub struct SessionManager {
    flow: Option<LoginFlow>,
    sign_in: UrlPattern,
    state: SessionState,
    last_verified_at: Option<DateTime<Utc>>,
    login_attempts: u32,
}

impl SessionManager {
    /// Creates a manager that logs in with the given credentials
    pub fn new(config: &SessionConfig, crawler: &CrawlerConfig, credentials: Credentials) -> Self {
        Self {
            flow: Some(LoginFlow {
                config: config.clone(),
                credentials,
                post_login: UrlPattern::new(&config.post_login_patterns),
                consent_selector: crawler.consent_selector.clone(),
                consent_timeout: crawler.consent_timeout(),
                poll_interval: crawler.poll_interval(),
            }),
            sign_in: UrlPattern::new(&config.sign_in_patterns),
            state: SessionState::Unauthenticated,
            last_verified_at: None,
            login_attempts: 0,
        }
    }

    /// Creates a manager for a site that needs no login
    pub fn anonymous() -> Self {
        Self {
            flow: None,
            sign_in: UrlPattern::default(),
            state: SessionState::Authenticated,
            last_verified_at: None,
            login_attempts: 0,
        }
    }

    /// Creates the manager `config` asks for
    ///
    /// Anonymous when there is no `[session]` table; otherwise credentials
    /// are requested from `provider` immediately so a missing secret fails
    /// before any page is fetched.
    pub fn from_config(
        config: &Config,
        provider: &dyn CredentialProvider,
    ) -> Result<Self, CrawlError> {
        match &config.session {
            None => Ok(Self::anonymous()),
            Some(session) => Ok(Self::new(session, &config.crawler, provider.credentials()?)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_anonymous(&self) -> bool {
        self.flow.is_none()
    }

    /// When the last successful login finished
    pub fn last_verified_at(&self) -> Option<DateTime<Utc>> {
        self.last_verified_at
    }

    /// Number of logins attempted so far
    pub fn login_attempts(&self) -> u32 {
        self.login_attempts
    }

    /// Makes sure the session is authenticated, logging in if needed
    ///
    /// Returns immediately when already authenticated.
    ///
    /// # Errors
    ///
    /// * `CrawlError::AuthenticationFailure` - The login page could not be
    ///   used, a credential field was missing, or no post-login URL appeared
    ///   within the login timeout. The state is left `Unauthenticated`.
    pub async fn ensure_authenticated(
        &mut self,
        driver: &mut (dyn RenderDriver + '_),
    ) -> Result<(), CrawlError> {
        if self.state == SessionState::Authenticated {
            return Ok(());
        }

        let flow = match &self.flow {
            Some(flow) => flow,
            None => {
                self.state = SessionState::Authenticated;
                return Ok(());
            }
        };

        self.state = SessionState::Authenticating;
        self.login_attempts += 1;
        tracing::info!(
            "Logging in at {} (attempt {})",
            flow.config.login_url,
            self.login_attempts
        );

        match perform_login(flow, driver).await {
            Ok(landed) => {
                self.state = SessionState::Authenticated;
                self.last_verified_at = Some(Utc::now());
                tracing::info!("Logged in, landed on {}", landed);
                tokio::time::sleep(flow.config.post_login_settle()).await;
                Ok(())
            }
            Err(reason) => {
                self.state = SessionState::Unauthenticated;
                tracing::error!("Login failed: {}", reason);
                Err(CrawlError::AuthenticationFailure(reason))
            }
        }
    }

    /// Records that the site has dropped the session
    pub fn mark_expired(&mut self) {
        if self.state == SessionState::Authenticated {
            tracing::warn!("Session expired");
            self.state = SessionState::Expired;
        }
    }

    /// Returns true if a navigation to `requested` ended on a sign-in page
    ///
    /// A request that targets a sign-in page itself is not a redirect.
    pub fn is_sign_in_redirect(&self, requested: &str, landed: &str) -> bool {
        !self.sign_in.is_empty() && self.sign_in.matches(landed) && !self.sign_in.matches(requested)
    }
}

/// Drives the login form; returns the post-login URL or a failure reason
async fn perform_login(
    flow: &LoginFlow,
    driver: &mut (dyn RenderDriver + '_),
) -> Result<String, String> {
    let cfg = &flow.config;
    let describe = |step: &str, e: DriverError| format!("{}: {}", step, e);

    driver
        .navigate(&cfg.login_url)
        .await
        .map_err(|e| describe("opening login page", e))?;

    // readiness is best-effort here, the identity field wait below is the real gate
    let _ = wait_for(
        driver,
        &Condition::DocumentReady,
        cfg.field_timeout(),
        flow.poll_interval,
    )
    .await;

    dismiss_consent(
        driver,
        &flow.consent_selector,
        flow.consent_timeout,
        flow.poll_interval,
    )
    .await;

    let present = wait_for(
        driver,
        &Condition::ElementPresent(&cfg.identity_selector),
        cfg.field_timeout(),
        flow.poll_interval,
    )
    .await
    .map_err(|e| describe("waiting for identity field", e))?;
    if present == WaitOutcome::TimedOut {
        return Err(format!(
            "identity field '{}' not found within {:?}",
            cfg.identity_selector,
            cfg.field_timeout()
        ));
    }

    let identity = first_element(driver, &cfg.identity_selector, "identity").await?;
    driver
        .send_keys(identity, flow.credentials.identity())
        .await
        .map_err(|e| describe("typing identity", e))?;

    let secret = first_element(driver, &cfg.secret_selector, "secret").await?;
    driver
        .send_keys(secret, flow.credentials.secret())
        .await
        .map_err(|e| describe("typing secret", e))?;

    let submit = first_element(driver, &cfg.submit_selector, "submit").await?;
    driver
        .submit(submit)
        .await
        .map_err(|e| describe("submitting login form", e))?;

    let outcome = wait_for(
        driver,
        &Condition::UrlMatches(&flow.post_login),
        cfg.login_timeout(),
        flow.poll_interval,
    )
    .await
    .map_err(|e| describe("waiting for post-login page", e))?;

    let landed = driver
        .current_url()
        .await
        .map_err(|e| describe("reading post-login URL", e))?;

    match outcome {
        WaitOutcome::Satisfied => Ok(landed),
        WaitOutcome::TimedOut => Err(format!(
            "no post-login page within {:?} (still on {})",
            cfg.login_timeout(),
            landed
        )),
    }
}

async fn first_element(
    driver: &mut (dyn RenderDriver + '_),
    selector: &str,
    field: &str,
) -> Result<crate::driver::ElementRef, String> {
    driver
        .find_elements(selector)
        .await
        .map_err(|e| format!("looking up {} field: {}", field, e))?
        .into_iter()
        .next()
        .ok_or_else(|| format!("{} field '{}' not found", field, selector))
}
