use crate::entry::{Entry, SEPARATOR};
use crate::error::{Result, ShipError};
use crate::key::Key;
use crate::observability::Metrics;
use crate::options::ProcessorOptions;
use crate::parcel::Parcel;
use crate::storage::Storage;
use crate::uploader::Uploader;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Flush watchers spawned so far, plus failures of those already reaped.
#[derive(Default)]
struct Watchers {
    tasks: JoinSet<Result<()>>,
    errors: Vec<ShipError>,
}

impl Watchers {
    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Some(e) = watcher_error(result) {
                self.errors.push(e);
            }
        }
    }
}

fn watcher_error(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Option<ShipError> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => Some(ShipError::Watcher(e)),
    }
}

/// Processor routes entries to per-key parcels and owns the upload queue
///
/// Architecture:
/// 1. Producers call `queue_entry(storage, key, entry)` concurrently
/// 2. The parcel for `key` is looked up or created (first caller wins and
///    binds `storage`); creation spawns one timed flush watcher
/// 3. The parcel buffers the line, or cuts a shipment into the uploader's
///    bounded queue when it is full
/// 4. A watcher removes its parcel from the map when its interval elapses
///    and flushes it through the unbounded queue
/// 5. `close()` fences the watchers, closes every remaining parcel, then
///    drains the uploader
///
/// Producers hold the read side of `gate` for the whole call; removals take
/// the write side, so a lookup never races a removal of the same key.
pub struct Processor {
    options: ProcessorOptions,
    global_limit: usize,
    gate: RwLock<()>,
    parcels: DashMap<Key, Arc<Parcel>>,
    buffered_bytes: AtomicUsize,
    uploader: Uploader,
    shutdown: CancellationToken,
    watchers: Mutex<Watchers>,
    metrics: Arc<Metrics>,
}

impl Processor {
    pub fn new(options: ProcessorOptions) -> Arc<Self> {
        let metrics = Arc::new(Metrics::new());
        // A lone entry of up to `entry_limit` may start a buffer, so a
        // shipment can outgrow `shipment_limit` by at most one entry.
        let upload_limit = options.shipment_limit.saturating_add(options.entry_limit);
        let uploader = Uploader::new(options.uploading.clone(), upload_limit, Arc::clone(&metrics));

        info!(
            entry_limit = options.entry_limit,
            shipment_limit = options.shipment_limit,
            shipment_interval = ?options.shipment_interval,
            global_limit = options.global_limit(),
            "Creating log processor"
        );

        Arc::new(Self {
            global_limit: options.global_limit(),
            options,
            gate: RwLock::new(()),
            parcels: DashMap::new(),
            buffered_bytes: AtomicUsize::new(0),
            uploader,
            shutdown: CancellationToken::new(),
            watchers: Mutex::new(Watchers::default()),
            metrics,
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(ProcessorOptions::default())
    }

    /// Buffer one entry for `key`.
    ///
    /// `storage` is bound to the key's parcel only when this call creates it.
    /// May ship the parcel's previous contents through the bounded upload
    /// queue, in which case `QueueLimit` can surface here.
    pub async fn queue_entry<E>(
        self: &Arc<Self>,
        storage: Arc<dyn Storage>,
        key: &Key,
        entry: &E,
    ) -> Result<()>
    where
        E: Entry + ?Sized,
    {
        let entry_size = entry.size() + SEPARATOR.len();

        let buffered = self.buffered_bytes.load(Ordering::Relaxed);
        if buffered + entry_size > self.global_limit {
            self.metrics.global_limit_exceeded();
            warn!(
                buffered,
                entry_size,
                global_limit = self.global_limit,
                "Buffered log bytes over global limit"
            );
        }

        let _gate = self.gate.read().await;
        if self.shutdown.is_cancelled() {
            self.metrics.entry_rejected();
            return Err(ShipError::Closed);
        }

        let (parcel, created) = match self.parcels.entry(key.clone()) {
            MapEntry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            MapEntry::Vacant(vacant) => {
                let parcel = Arc::new(Parcel::new(
                    key,
                    storage,
                    self.options.entry_limit,
                    self.options.shipment_limit,
                ));
                vacant.insert(Arc::clone(&parcel));
                (parcel, true)
            }
        };

        if created {
            debug!(%key, "Parcel created");
            if !self.options.shipment_interval.is_zero() {
                self.spawn_watcher(key.clone(), self.options.shipment_interval)
                    .await;
            }
        }

        if entry_size > parcel.entry_limit() {
            self.metrics.entry_rejected();
            return Err(ShipError::TooLarge {
                size: entry_size,
                limit: parcel.entry_limit(),
            });
        }

        let shipped = match parcel.add(&self.uploader, entry_size, &entry.line()).await {
            Ok(shipped) => shipped,
            Err(refused) => {
                self.release(refused.dropped);
                self.metrics.entry_rejected();
                return Err(refused.error);
            }
        };

        self.buffered_bytes.fetch_add(entry_size, Ordering::Relaxed);
        self.release(shipped);
        self.metrics.entry_accepted();
        Ok(())
    }

    async fn spawn_watcher(self: &Arc<Self>, key: Key, interval: Duration) {
        let mut watchers = self.watchers.lock().await;
        watchers.reap_finished();
        if self.shutdown.is_cancelled() {
            return;
        }

        let processor = Arc::clone(self);
        watchers
            .tasks
            .spawn(async move { processor.timed_flush(key, interval).await });
    }

    /// Wait out `interval`, then take the parcel out of the map and ship it.
    /// Exits without flushing if shutdown comes first.
    async fn timed_flush(&self, key: Key, interval: Duration) -> Result<()> {
        tokio::select! {
            () = self.shutdown.cancelled() => return Ok(()),
            () = tokio::time::sleep(interval) => {}
        }

        let parcel = {
            let _gate = self.gate.write().await;
            self.parcels.remove(&key).map(|(_, parcel)| parcel)
        };
        let Some(parcel) = parcel else {
            return Ok(());
        };

        match parcel.close(&self.uploader).await {
            Ok(shipped) => {
                self.release(shipped);
                debug!(%key, size = shipped, "Timed flush shipped parcel");
                Ok(())
            }
            Err(e) => {
                warn!(%key, error = %e, "Timed flush failed");
                Err(e)
            }
        }
    }

    fn release(&self, shipped: usize) {
        if shipped == 0 {
            return;
        }
        // The counter is advisory; clamp instead of wrapping.
        let _ = self
            .buffered_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(shipped))
            });
    }

    /// Run the upload consumer until `close()` has drained it.
    pub async fn run(&self) -> Result<()> {
        self.uploader.run().await
    }

    /// Graceful shutdown. Must be called while `run()` is active.
    ///
    /// Any error means shutdown finished with some data lost; all failures
    /// from watchers, parcels and the uploader are combined.
    pub async fn close(&self) -> Result<()> {
        info!(parcels = self.parcels.len(), "Closing log processor");
        let mut errors = Vec::new();

        self.shutdown.cancel();
        let mut tasks = {
            let mut watchers = self.watchers.lock().await;
            errors.append(&mut watchers.errors);
            std::mem::take(&mut watchers.tasks)
        };
        while let Some(result) = tasks.join_next().await {
            errors.extend(watcher_error(result));
        }

        for parcel in self.take_parcels().await {
            match parcel.close(&self.uploader).await {
                Ok(shipped) => self.release(shipped),
                Err(e) => {
                    warn!(error = %e, "Failed to flush parcel on shutdown");
                    errors.push(e);
                }
            }
        }

        if let Err(e) = self.uploader.close().await {
            errors.push(e);
        }

        if !errors.is_empty() {
            warn!(errors = errors.len(), "Log processor closed with errors");
        }
        ShipError::aggregate(errors)
    }

    async fn take_parcels(&self) -> Vec<Arc<Parcel>> {
        let _gate = self.gate.write().await;
        let keys: Vec<Key> = self.parcels.iter().map(|item| item.key().clone()).collect();
        keys.iter()
            .filter_map(|key| self.parcels.remove(key).map(|(_, parcel)| parcel))
            .collect()
    }

    /// Approximate bytes buffered across all parcels.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes.load(Ordering::Relaxed)
    }

    pub fn parcel_count(&self) -> usize {
        self.parcels.len()
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.parcels.contains_key(key)
    }

    pub fn queue_depth(&self) -> usize {
        self.uploader.queue_depth()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }
}
