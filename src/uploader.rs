use crate::error::{Result, ShipError};
use crate::observability::Metrics;
use crate::options::UploadingOptions;
use crate::storage::{Storage, StorageError};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A finished shipment waiting to be written
struct UploadJob {
    storage: Arc<dyn Storage>,
    bucket: String,
    key: String,
    body: Bytes,
    retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploaderState {
    /// Admitting jobs, consumer processing them
    Running,
    /// No new jobs; consumer works the in-flight count down to zero
    Draining,
    /// Drained; the consumer loop has exited or is about to
    Stopped,
}

/// Uploader serializes all storage writes through one consumer
///
/// Architecture:
/// 1. Parcels call `queue_upload` (bounded) or
///    `queue_upload_without_queue_limit` (timed flush, shutdown)
/// 2. Admission bumps the in-flight counter and pushes the job on an
///    unbounded channel; the counter, not the channel, enforces `queue_limit`
/// 3. `run()` pops jobs one at a time and calls `Storage::put` under
///    `upload_timeout`
/// 4. Failed jobs go to the back of the channel with `retry_count + 1`
///    until `retry_limit`, then are dropped
/// 5. `close()` stops admission and waits for the counter to hit zero
pub struct Uploader {
    options: UploadingOptions,
    entry_limit: usize,
    sender: mpsc::UnboundedSender<UploadJob>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<UploadJob>>>,
    state: Mutex<UploaderState>,
    in_flight: AtomicUsize,
    drained: CancellationToken,
    metrics: Arc<Metrics>,
}

impl Uploader {
    /// `entry_limit` caps the size of a single shipment body.
    pub fn new(options: UploadingOptions, entry_limit: usize, metrics: Arc<Metrics>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        Self {
            options,
            entry_limit,
            sender,
            receiver: Mutex::new(Some(receiver)),
            state: Mutex::new(UploaderState::Running),
            in_flight: AtomicUsize::new(0),
            drained: CancellationToken::new(),
            metrics,
        }
    }

    /// Queue a shipment, refusing with `QueueLimit` once `queue_limit`
    /// uploads are in flight.
    pub async fn queue_upload(
        &self,
        storage: Arc<dyn Storage>,
        bucket: &str,
        key: String,
        body: Bytes,
    ) -> Result<()> {
        self.admit(storage, bucket, key, body, true).await
    }

    /// Queue a shipment regardless of the in-flight count. Used where
    /// draining has to make progress.
    pub async fn queue_upload_without_queue_limit(
        &self,
        storage: Arc<dyn Storage>,
        bucket: &str,
        key: String,
        body: Bytes,
    ) -> Result<()> {
        self.admit(storage, bucket, key, body, false).await
    }

    async fn admit(
        &self,
        storage: Arc<dyn Storage>,
        bucket: &str,
        key: String,
        body: Bytes,
        bounded: bool,
    ) -> Result<()> {
        let state = self.state.lock().await;
        if *state != UploaderState::Running {
            return Err(ShipError::Closed);
        }

        let size = body.len();
        if size > self.entry_limit {
            return Err(ShipError::TooLarge {
                size,
                limit: self.entry_limit,
            });
        }

        // Increments only happen under the state lock, so check-then-add is atomic.
        if bounded && self.in_flight.load(Ordering::SeqCst) >= self.options.queue_limit {
            return Err(ShipError::QueueLimit {
                limit: self.options.queue_limit,
            });
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let job = UploadJob {
            storage,
            bucket: bucket.to_string(),
            key,
            body,
            retry_count: 0,
        };

        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!(key = %job.key, "Upload consumer gone, shipment refused");
            return Err(ShipError::Closed);
        }
        drop(state);

        self.metrics.shipment_queued();
        debug!(bucket, size, bounded, "Shipment queued for upload");
        Ok(())
    }

    /// Consumer loop. Returns once the queue has been drained after `close()`.
    ///
    /// Only one consumer may ever run; a second call returns `Closed`.
    pub async fn run(&self) -> Result<()> {
        let mut receiver = self.receiver.lock().await.take().ok_or(ShipError::Closed)?;
        info!(
            queue_limit = self.options.queue_limit,
            retry_limit = self.options.retry_limit,
            "Upload consumer started"
        );

        loop {
            tokio::select! {
                biased;
                Some(job) = receiver.recv() => self.process(job).await,
                () = self.drained.cancelled() => break,
            }
        }

        info!("Upload consumer stopped");
        Ok(())
    }

    async fn process(&self, mut job: UploadJob) {
        let timeout = self.options.upload_timeout;
        let result = tokio::time::timeout(
            timeout,
            job.storage.put(&job.bucket, &job.key, job.body.clone()),
        )
        .await
        .unwrap_or(Err(StorageError::Timeout(timeout)));

        match result {
            Ok(()) => {
                self.metrics.upload_succeeded();
                debug!(
                    bucket = %job.bucket,
                    key = %job.key,
                    size = job.body.len(),
                    retry = job.retry_count,
                    "Upload completed"
                );
                self.finish_job().await;
            }
            Err(e) if job.retry_count >= self.options.retry_limit => {
                self.metrics.upload_dropped();
                error!(
                    bucket = %job.bucket,
                    key = %job.key,
                    size = job.body.len(),
                    retry = job.retry_count,
                    error = %e,
                    "Upload failed after retries, shipment dropped"
                );
                self.finish_job().await;
            }
            Err(e) => {
                job.retry_count += 1;
                self.metrics.upload_retried();
                warn!(
                    bucket = %job.bucket,
                    key = %job.key,
                    retry = job.retry_count,
                    error = %e,
                    "Upload failed, requeueing"
                );

                // Not a new admission: the in-flight count is left alone.
                if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
                    self.metrics.upload_dropped();
                    error!(key = %job.key, "Upload queue closed, shipment dropped");
                    self.finish_job().await;
                }
            }
        }
    }

    async fn finish_job(&self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining > 0 {
            return;
        }

        let mut state = self.state.lock().await;
        if *state == UploaderState::Draining {
            *state = UploaderState::Stopped;
            self.drained.cancel();
        }
    }

    /// Stop admitting jobs and wait up to `shutdown_timeout` for the queue to
    /// drain. Safe to call repeatedly.
    ///
    /// On timeout the remaining jobs stay queued and are lost if the process
    /// exits.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if *state == UploaderState::Running {
                *state = UploaderState::Draining;
                info!(in_flight = self.queue_depth(), "Upload queue draining");
            }
            if *state == UploaderState::Draining && self.queue_depth() == 0 {
                *state = UploaderState::Stopped;
                self.drained.cancel();
            }
        }

        let timeout = self.options.shutdown_timeout;
        match tokio::time::timeout(timeout, self.drained.cancelled()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    in_flight = self.queue_depth(),
                    ?timeout,
                    "Upload queue not drained before shutdown timeout"
                );
                Err(ShipError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Uploads admitted but not yet completed or dropped.
    pub fn queue_depth(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> UploaderState {
        *self.state.lock().await
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }
}
