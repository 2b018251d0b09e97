use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the shipping engine to producers and to `Processor::close`.
#[derive(Debug, Error)]
pub enum ShipError {
    #[error("too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("upload queue limit reached ({limit} uploads in flight)")]
    QueueLimit { limit: usize },

    #[error("closed")]
    Closed,

    #[error("upload queue not drained within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("flush watcher failed: {0}")]
    Watcher(#[from] tokio::task::JoinError),

    #[error("{}", join_messages(.0))]
    Aggregate(Vec<ShipError>),
}

impl ShipError {
    pub fn is_too_large(&self) -> bool {
        matches!(self, ShipError::TooLarge { .. })
    }

    pub fn is_queue_limit(&self) -> bool {
        matches!(self, ShipError::QueueLimit { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ShipError::Closed)
    }

    /// True when the upload queue was abandoned, alone or among other failures.
    pub fn is_shutdown_timeout(&self) -> bool {
        match self {
            ShipError::ShutdownTimeout(_) => true,
            ShipError::Aggregate(errors) => errors.iter().any(ShipError::is_shutdown_timeout),
            _ => false,
        }
    }

    /// Collapse collected errors: none is success, one is returned as is.
    pub fn aggregate(mut errors: Vec<ShipError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ShipError::Aggregate(errors)),
        }
    }
}

fn join_messages(errors: &[ShipError]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} errors: {}", errors.len(), messages.join("; "))
}

pub type Result<T> = std::result::Result<T, ShipError>;
