//! Configuration management for logship
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use logship::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Shipments cut at: {}", config.shipping.shipment_limit);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `LOGSHIP__<section>__<key>`
//!
//! Examples:
//! - `LOGSHIP__SHIPPING__SHIPMENT_LIMIT=16MB`
//! - `LOGSHIP__SHIPPING__SHIPMENT_INTERVAL_MS=60000`
//! - `LOGSHIP__UPLOADING__QUEUE_LIMIT=200`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/logship.toml`.
//! This can be overridden using the `LOGSHIP_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, ShippingConfig, StorageConfig, StorageProvider, UploadingConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`LOGSHIP__*`)
    /// 2. TOML file (default: `config/logship.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
