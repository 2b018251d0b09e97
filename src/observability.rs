//! Counters and tracing setup

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Metrics handle shared by the processor and the uploader
#[derive(Debug, Default)]
pub struct Metrics {
    entries_accepted: AtomicU64,
    entries_rejected: AtomicU64,
    shipments_queued: AtomicU64,
    uploads_succeeded: AtomicU64,
    uploads_retried: AtomicU64,
    uploads_dropped: AtomicU64,
    global_limit_exceeded: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_accepted(&self) {
        self.entries_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entry_rejected(&self) {
        self.entries_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "entries_rejected", "Metric incremented");
    }

    pub fn shipment_queued(&self) {
        self.shipments_queued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "shipments_queued", "Metric incremented");
    }

    pub fn upload_succeeded(&self) {
        self.uploads_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "uploads_succeeded", "Metric incremented");
    }

    pub fn upload_retried(&self) {
        self.uploads_retried.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "uploads_retried", "Metric incremented");
    }

    pub fn upload_dropped(&self) {
        self.uploads_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "uploads_dropped", "Metric incremented");
    }

    pub fn global_limit_exceeded(&self) {
        self.global_limit_exceeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "global_limit_exceeded", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entries_accepted: self.entries_accepted.load(Ordering::Relaxed),
            entries_rejected: self.entries_rejected.load(Ordering::Relaxed),
            shipments_queued: self.shipments_queued.load(Ordering::Relaxed),
            uploads_succeeded: self.uploads_succeeded.load(Ordering::Relaxed),
            uploads_retried: self.uploads_retried.load(Ordering::Relaxed),
            uploads_dropped: self.uploads_dropped.load(Ordering::Relaxed),
            global_limit_exceeded: self.global_limit_exceeded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub entries_accepted: u64,
    pub entries_rejected: u64,
    pub shipments_queued: u64,
    pub uploads_succeeded: u64,
    pub uploads_retried: u64,
    pub uploads_dropped: u64,
    pub global_limit_exceeded: u64,
}
