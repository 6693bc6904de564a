use crate::config::types::{
    CleaningConfig, Config, CrawlerConfig, DriverConfig, ExpansionConfig, OriginConfig,
    OutputConfig, SessionConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Upper bound on the worker pool
pub const MAX_WORKERS: usize = 16;

/// Upper bound on expansion rounds
pub const MAX_EXPANSION_ROUNDS: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_driver_config(&config.driver)?;
    validate_origin_config(&config.origin)?;
    if let Some(session) = &config.session {
        validate_session_config(session)?;
    }
    validate_expansion_config(&config.expansion)?;
    validate_cleaning_config(&config.cleaning)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be > 0".to_string(),
        ));
    }

    validate_selector("consent_selector", &config.consent_selector)?;

    Ok(())
}

/// Validates browser paths when they are given
fn validate_driver_config(config: &DriverConfig) -> Result<(), ConfigError> {
    let paths = [
        ("executable", &config.executable),
        ("profile_root", &config.profile_root),
    ];
    for (field, value) in paths {
        if matches!(value, Some(path) if path.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "driver {} cannot be empty when set",
                field
            )));
        }
    }
    Ok(())
}

/// Validates seeds and the start URL
fn validate_origin_config(config: &OriginConfig) -> Result<(), ConfigError> {
    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "origin must have at least one seed URL".to_string(),
        ));
    }

    for seed in &config.seeds {
        validate_http_url("seed", seed)?;
    }

    if let Some(start_url) = &config.start_url {
        validate_http_url("start_url", start_url)?;
    }

    Ok(())
}

/// Validates the login flow
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    validate_http_url("login_url", &config.login_url)?;

    if config.post_login_patterns.iter().all(|p| p.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "post_login_patterns must contain at least one pattern".to_string(),
        ));
    }

    if config.sign_in_patterns.iter().all(|p| p.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "sign_in_patterns must contain at least one pattern".to_string(),
        ));
    }

    validate_selector("identity_selector", &config.identity_selector)?;
    validate_selector("secret_selector", &config.secret_selector)?;
    validate_selector("submit_selector", &config.submit_selector)?;

    if config.identity_env.is_empty() || config.secret_env.is_empty() {
        return Err(ConfigError::Validation(
            "identity_env and secret_env cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates expansion selectors and bounds
fn validate_expansion_config(config: &ExpansionConfig) -> Result<(), ConfigError> {
    if config.max_rounds < 1 || config.max_rounds > MAX_EXPANSION_ROUNDS {
        return Err(ConfigError::Validation(format!(
            "max_rounds must be between 1 and {}, got {}",
            MAX_EXPANSION_ROUNDS, config.max_rounds
        )));
    }

    for selector in &config.selectors {
        validate_selector("expansion selector", selector)?;
    }

    if config.try_it_out {
        validate_selector("try_it_out_selector", &config.try_it_out_selector)?;
    }

    Ok(())
}

fn validate_cleaning_config(config: &CleaningConfig) -> Result<(), ConfigError> {
    for selector in &config.noise_selectors {
        validate_selector("noise selector", selector)?;
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates that a URL parses and uses HTTP(S)
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            field, value
        )));
    }

    Ok(())
}

/// Validates that a CSS selector parses
fn validate_selector(field: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|e| {
        ConfigError::InvalidSelector(format!("{} '{}': {:?}", field, selector, e))
    })?;
    Ok(())
}
