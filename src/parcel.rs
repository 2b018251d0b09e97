//! Per-destination accumulation buffer

use crate::entry::SEPARATOR;
use crate::error::{Result, ShipError};
use crate::key::{Key, object_key};
use crate::storage::Storage;
use crate::uploader::Uploader;
use bytes::BytesMut;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// An `add` that did not buffer its line.
#[derive(Debug)]
pub struct Refused {
    pub error: ShipError,
    /// Previously buffered bytes drained for a shipment that was refused.
    pub dropped: usize,
}

impl From<ShipError> for Refused {
    fn from(error: ShipError) -> Self {
        Self { error, dropped: 0 }
    }
}

struct ParcelState {
    buffer: BytesMut,
    closed: bool,
}

/// Buffers serialized entries for one `Key` and cuts them into shipments.
///
/// The buffer held between calls always stays below
/// `shipment_limit + one entry`: a shipment is cut before an append that
/// would reach the limit.
pub struct Parcel {
    entry_limit: usize,
    shipment_limit: usize,
    storage: Arc<dyn Storage>,
    bucket: String,
    prefix: String,
    state: Mutex<ParcelState>,
}

impl Parcel {
    pub fn new(
        key: &Key,
        storage: Arc<dyn Storage>,
        entry_limit: usize,
        shipment_limit: usize,
    ) -> Self {
        Self {
            entry_limit,
            shipment_limit,
            storage,
            bucket: key.bucket.clone(),
            prefix: key.prefix.clone(),
            state: Mutex::new(ParcelState {
                buffer: BytesMut::new(),
                closed: false,
            }),
        }
    }

    pub fn entry_limit(&self) -> usize {
        self.entry_limit
    }

    /// Append `line` (accounted as `entry_size` bytes), shipping the current
    /// buffer first if the append would reach the shipment limit.
    ///
    /// Returns the number of bytes shipped, zero on the fast path.
    ///
    /// If the bounded upload queue refuses the shipment, the drained bytes
    /// are not put back and `line` is not buffered; `Refused::dropped`
    /// reports how many bytes went with it.
    ///
    /// An empty buffer is never shipped here: an entry that alone reaches
    /// `shipment_limit` is buffered and goes out with the next shipment.
    pub async fn add(
        &self,
        uploader: &Uploader,
        entry_size: usize,
        line: &str,
    ) -> std::result::Result<usize, Refused> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ShipError::Closed.into());
        }

        if state.buffer.len() + entry_size < self.shipment_limit {
            append(&mut state.buffer, line);
            return Ok(0);
        }

        let mut shipped = 0;
        if !state.buffer.is_empty() {
            let body = state.buffer.split().freeze();
            shipped = body.len();
            let key = object_key(&self.prefix);
            debug!(bucket = %self.bucket, key = %key, size = shipped, "Parcel full, shipping");

            uploader
                .queue_upload(Arc::clone(&self.storage), &self.bucket, key, body)
                .await
                .map_err(|error| Refused {
                    error,
                    dropped: shipped,
                })?;
        }

        append(&mut state.buffer, line);
        Ok(shipped)
    }

    /// Ship whatever is buffered, even if empty, bypassing the queue limit.
    pub async fn flush(&self, uploader: &Uploader) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ship_all(&mut state, uploader).await
    }

    /// Close the parcel and ship its terminal contents. Later calls ship
    /// nothing and return zero.
    pub async fn close(&self, uploader: &Uploader) -> Result<usize> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(0);
        }
        state.closed = true;
        self.ship_all(&mut state, uploader).await
    }

    async fn ship_all(&self, state: &mut ParcelState, uploader: &Uploader) -> Result<usize> {
        let body = state.buffer.split().freeze();
        let shipped = body.len();
        let key = object_key(&self.prefix);
        debug!(bucket = %self.bucket, key = %key, size = shipped, "Flushing parcel");

        uploader
            .queue_upload_without_queue_limit(Arc::clone(&self.storage), &self.bucket, key, body)
            .await?;
        Ok(shipped)
    }

    /// Bytes currently buffered.
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }
}

fn append(buffer: &mut BytesMut, line: &str) {
    buffer.extend_from_slice(line.as_bytes());
    buffer.extend_from_slice(SEPARATOR);
}
