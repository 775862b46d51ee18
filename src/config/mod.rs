//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use listing_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Request interval: {}ms", config.crawler.request_interval_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputConfig, ParserConfig, SearchConfig, SeedConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

use crate::url::render_search_url;
use crate::ConfigError;
use std::path::PathBuf;
use url::Url;

impl Config {
    /// Resolves the URL of the first index page
    ///
    /// Uses `[seed] start-url` when present, otherwise renders page 1 of the
    /// `[search]` template.
    pub fn seed_url(&self) -> Result<Url, ConfigError> {
        let raw = match (&self.seed, &self.search) {
            (Some(seed), None) => seed.start_url.clone(),
            (None, Some(search)) => render_search_url(search, 1),
            _ => {
                return Err(ConfigError::Validation(
                    "exactly one of [seed] or [search] must be configured".to_string(),
                ))
            }
        };

        Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(format!("seed URL '{}': {}", raw, e)))
    }

    /// Path of the JSON result document
    pub fn results_path(&self) -> PathBuf {
        PathBuf::from(&self.output.results_path)
    }
}
