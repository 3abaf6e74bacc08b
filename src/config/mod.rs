//! Configuration module for Dataset-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so a missing or empty file yields a usable config.
//!
//! # Example
//!
//! ```no_run
//! use dataset_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Max concurrency: {}", config.crawler.max_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, GatewayConfig, OutputConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
