//! Log entries as seen by the shipping engine
//!
//! Formatting of access-log records happens upstream; the engine only needs
//! a size for accounting and the serialized line to buffer.

/// Line separator appended after every buffered entry.
pub const SEPARATOR: &[u8] = b"\n";

/// A single serialized log record.
pub trait Entry: Send + Sync {
    /// Size of the serialized line in bytes, without the separator.
    fn size(&self) -> usize;

    /// The serialized line, without the separator.
    fn line(&self) -> String;
}

impl Entry for str {
    fn size(&self) -> usize {
        self.len()
    }

    fn line(&self) -> String {
        self.to_string()
    }
}

impl Entry for String {
    fn size(&self) -> usize {
        self.len()
    }

    fn line(&self) -> String {
        self.clone()
    }
}
