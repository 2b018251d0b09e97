//! Runtime options for the processor and its upload queue

use std::time::Duration;

/// Largest accepted single entry, separator included.
pub const DEFAULT_ENTRY_LIMIT: usize = 2 * 1024;
/// Buffered bytes per destination before a shipment is cut.
pub const DEFAULT_SHIPMENT_LIMIT: usize = 63 * 1024 * 1024;
/// Soft global budget, as a multiple of the shipment limit.
pub const GLOBAL_LIMIT_FACTOR: usize = 100;

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub entry_limit: usize,
    pub shipment_limit: usize,
    /// Per-destination flush period. Zero disables timed flushing.
    pub shipment_interval: Duration,
    /// Advisory budget for all buffered bytes. `None` means
    /// `GLOBAL_LIMIT_FACTOR * shipment_limit`.
    pub global_limit: Option<usize>,
    pub uploading: UploadingOptions,
}

impl ProcessorOptions {
    pub fn global_limit(&self) -> usize {
        self.global_limit
            .unwrap_or_else(|| self.shipment_limit.saturating_mul(GLOBAL_LIMIT_FACTOR))
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            entry_limit: DEFAULT_ENTRY_LIMIT,
            shipment_limit: DEFAULT_SHIPMENT_LIMIT,
            shipment_interval: Duration::ZERO,
            global_limit: None,
            uploading: UploadingOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadingOptions {
    /// Max uploads in flight admitted through the bounded path.
    pub queue_limit: usize,
    /// Retries after the first failed attempt before a job is dropped.
    pub retry_limit: u32,
    pub shutdown_timeout: Duration,
    pub upload_timeout: Duration,
}

impl Default for UploadingOptions {
    fn default() -> Self {
        Self {
            queue_limit: 100,
            retry_limit: 3,
            shutdown_timeout: Duration::from_secs(60),
            upload_timeout: Duration::from_secs(5 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ProcessorOptions::default();
        assert_eq!(options.entry_limit, 2048);
        assert_eq!(options.shipment_limit, 63 * 1024 * 1024);
        assert!(options.shipment_interval.is_zero());
        assert_eq!(options.uploading.queue_limit, 100);
        assert_eq!(options.uploading.retry_limit, 3);
        assert_eq!(options.uploading.shutdown_timeout, Duration::from_secs(60));
        assert_eq!(options.uploading.upload_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_global_limit_follows_shipment_limit() {
        let mut options = ProcessorOptions {
            shipment_limit: 10,
            ..Default::default()
        };
        assert_eq!(options.global_limit(), 1000);

        options.global_limit = Some(42);
        assert_eq!(options.global_limit(), 42);
    }
}
