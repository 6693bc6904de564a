use crate::config::SessionConfig;
use crate::CrawlError;
use std::fmt;

/// Login identity and secret
///
/// Never logged: the `Debug` output redacts both values.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identity: String,
    secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials to the session manager
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Result<Credentials, CrawlError>;
}

/// Reads credentials from two environment variables
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    identity_var: String,
    secret_var: String,
}

impl EnvCredentials {
    pub fn new(identity_var: impl Into<String>, secret_var: impl Into<String>) -> Self {
        Self {
            identity_var: identity_var.into(),
            secret_var: secret_var.into(),
        }
    }

    /// Uses the variable names configured in `[session]`
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.identity_env, &config.secret_env)
    }

    fn read(var: &str) -> Result<String, CrawlError> {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(CrawlError::AuthenticationFailure(format!(
                "environment variable {} is not set",
                var
            ))),
        }
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials, CrawlError> {
        Ok(Credentials::new(
            Self::read(&self.identity_var)?,
            Self::read(&self.secret_var)?,
        ))
    }
}

/// Fixed credentials, mostly for tests and embedding
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, CrawlError> {
        Ok(self.0.clone())
    }
}
