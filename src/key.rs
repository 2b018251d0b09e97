//! Destination keys and shipment object names

use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identifies one logical log stream and where its shipments land.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub project_id: String,
    pub bucket: String,
    pub prefix: String,
}

impl Key {
    pub fn new(
        project_id: impl Into<String>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.project_id, self.bucket, self.prefix)
    }
}

/// Generate a unique object key for a new shipment under `prefix`.
///
/// Format: `<prefix>YYYY-MM-DD-HH-MM-SS-<16 uppercase hex>`, matching the
/// naming used by S3 server access logging.
pub fn object_key(prefix: &str) -> String {
    object_key_at(prefix, OffsetDateTime::now_utc(), Uuid::new_v4())
}

fn object_key_at(prefix: &str, now: OffsetDateTime, id: Uuid) -> String {
    let mut head = [0u8; 8];
    head.copy_from_slice(&id.as_bytes()[..8]);

    format!(
        "{}{:04}-{:02}-{:02}-{:02}-{:02}-{:02}-{:016X}",
        prefix,
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        u64::from_be_bytes(head),
    )
}
