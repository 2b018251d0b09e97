use crate::humanize::ByteSize;
use crate::options::{
    DEFAULT_ENTRY_LIMIT, DEFAULT_SHIPMENT_LIMIT, ProcessorOptions, UploadingOptions,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub shipping: ShippingConfig,
    #[serde(default)]
    pub uploading: UploadingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Runtime options for a `Processor` built from this configuration
    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            entry_limit: self.shipping.entry_limit.as_usize(),
            shipment_limit: self.shipping.shipment_limit.as_usize(),
            shipment_interval: Duration::from_millis(self.shipping.shipment_interval_ms),
            global_limit: self.shipping.global_limit.map(|limit| limit.as_usize()),
            uploading: UploadingOptions {
                queue_limit: self.uploading.queue_limit,
                retry_limit: self.uploading.retry_limit,
                shutdown_timeout: Duration::from_secs(self.uploading.shutdown_timeout_secs),
                upload_timeout: Duration::from_secs(self.uploading.upload_timeout_secs),
            },
        }
    }
}

/// Buffering and shipment sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShippingConfig {
    #[serde(default = "default_entry_limit")]
    pub entry_limit: ByteSize,
    #[serde(default = "default_shipment_limit")]
    pub shipment_limit: ByteSize,
    /// Per-destination flush period, 0 disables timed flushing
    #[serde(default)]
    pub shipment_interval_ms: u64,
    /// Advisory budget for all buffered bytes (default 100x shipment_limit)
    pub global_limit: Option<ByteSize>,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            entry_limit: default_entry_limit(),
            shipment_limit: default_shipment_limit(),
            shipment_interval_ms: 0,
            global_limit: None,
        }
    }
}

fn default_entry_limit() -> ByteSize {
    ByteSize(DEFAULT_ENTRY_LIMIT as u64)
}

fn default_shipment_limit() -> ByteSize {
    ByteSize(DEFAULT_SHIPMENT_LIMIT as u64)
}

/// Upload queue behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadingConfig {
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

impl Default for UploadingConfig {
    fn default() -> Self {
        Self {
            queue_limit: default_queue_limit(),
            retry_limit: default_retry_limit(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

fn default_queue_limit() -> usize {
    100
}

fn default_retry_limit() -> u32 {
    3
}

fn default_shutdown_timeout_secs() -> u64 {
    60
}

fn default_upload_timeout_secs() -> u64 {
    5 * 60
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Root directory for the local provider
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("data/shipments")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_processor_defaults() {
        let options = Config::default().processor_options();
        let defaults = ProcessorOptions::default();

        assert_eq!(options.entry_limit, defaults.entry_limit);
        assert_eq!(options.shipment_limit, defaults.shipment_limit);
        assert_eq!(options.shipment_interval, defaults.shipment_interval);
        assert_eq!(options.global_limit(), defaults.global_limit());
        assert_eq!(options.uploading.queue_limit, defaults.uploading.queue_limit);
        assert_eq!(options.uploading.upload_timeout, defaults.uploading.upload_timeout);
    }

    #[test]
    fn test_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
[shipping]
entry_limit = "4KB"
shipment_limit = "16MB"
shipment_interval_ms = 30000
global_limit = "1GB"

[uploading]
queue_limit = 8
retry_limit = 1

[storage]
provider = "memory"
            "#,
        )
        .unwrap();

        let options = config.processor_options();
        assert_eq!(options.entry_limit, 4 * 1024);
        assert_eq!(options.shipment_limit, 16 * 1024 * 1024);
        assert_eq!(options.shipment_interval, Duration::from_secs(30));
        assert_eq!(options.global_limit, Some(1024 * 1024 * 1024));
        assert_eq!(options.uploading.queue_limit, 8);
        assert_eq!(options.uploading.retry_limit, 1);
        assert_eq!(options.uploading.shutdown_timeout, Duration::from_secs(60));
        assert_eq!(config.storage.provider, StorageProvider::Memory);
    }
}
