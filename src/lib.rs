//! Batches access-log entries per destination and ships them to object
//! storage through a single retrying upload queue.

pub mod config;
pub mod entry;
pub mod error;
pub mod humanize;
pub mod key;
pub mod observability;
pub mod options;
pub mod parcel;
pub mod processor;
pub mod storage;
pub mod uploader;

pub use entry::Entry;
pub use error::{Result, ShipError};
pub use key::Key;
pub use options::{ProcessorOptions, UploadingOptions};
pub use processor::Processor;
pub use storage::Storage;
