//! Configuration module for Unfurl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every table except `[origin]` is optional and falls back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use unfurl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("unfurl.toml")).unwrap();
//! println!("Crawling with {} worker(s)", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CleaningConfig, Config, CrawlerConfig, DriverConfig, DriverKind, ExpansionConfig,
    OriginConfig, OutputConfig, SessionConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, MAX_EXPANSION_ROUNDS, MAX_WORKERS};
