//! Scriptable storage for tests and local development

use super::{Result, Storage, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// A shipment accepted by `MockStorage`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPut {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
}

/// Records successful puts and fails on demand.
#[derive(Debug, Default)]
pub struct MockStorage {
    puts: Mutex<Vec<RecordedPut>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every put fails.
    pub fn failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    /// The first `n` puts fail, later ones succeed.
    pub fn failing_times(n: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Every put sleeps for `delay` before completing.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Number of put calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().await.clone()
    }

    /// Concatenated bodies of all successful puts, in arrival order.
    pub async fn shipped_bytes(&self) -> Vec<u8> {
        self.puts
            .lock()
            .await
            .iter()
            .flat_map(|put| put.body.iter().copied())
            .collect()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::PutFailed(format!("mock failure for {}/{}", bucket, key)));
        }

        self.puts.lock().await.push(RecordedPut {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
        });
        Ok(())
    }
}
