use super::models::{Config, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    ZeroLimit { field: &'static str },

    #[error("entry_limit ({entry_limit}) exceeds shipment_limit ({shipment_limit})")]
    EntryLimitExceedsShipment { entry_limit: u64, shipment_limit: u64 },

    #[error("global_limit ({global_limit}) is below shipment_limit ({shipment_limit})")]
    GlobalLimitTooSmall { global_limit: u64, shipment_limit: u64 },

    #[error("Timeout must be positive: {field}")]
    ZeroTimeout { field: &'static str },

    #[error("Local storage requires a root directory")]
    MissingStorageRoot,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_shipping(config)?;
    validate_uploading(config)?;
    validate_storage(config)?;
    Ok(())
}

fn validate_shipping(config: &Config) -> Result<(), ValidationError> {
    let shipping = &config.shipping;
    let entry_limit = shipping.entry_limit.as_u64();
    let shipment_limit = shipping.shipment_limit.as_u64();

    if entry_limit == 0 {
        return Err(ValidationError::ZeroLimit { field: "entry_limit" });
    }
    if shipment_limit == 0 {
        return Err(ValidationError::ZeroLimit { field: "shipment_limit" });
    }
    // A single entry has to fit in one shipment
    if entry_limit > shipment_limit {
        return Err(ValidationError::EntryLimitExceedsShipment {
            entry_limit,
            shipment_limit,
        });
    }
    if let Some(global_limit) = shipping.global_limit {
        if global_limit.as_u64() < shipment_limit {
            return Err(ValidationError::GlobalLimitTooSmall {
                global_limit: global_limit.as_u64(),
                shipment_limit,
            });
        }
    }

    Ok(())
}

fn validate_uploading(config: &Config) -> Result<(), ValidationError> {
    let uploading = &config.uploading;

    if uploading.queue_limit == 0 {
        return Err(ValidationError::ZeroLimit { field: "queue_limit" });
    }
    if uploading.shutdown_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "shutdown_timeout_secs",
        });
    }
    if uploading.upload_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "upload_timeout_secs",
        });
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::Local
        && config.storage.root.as_os_str().is_empty()
    {
        return Err(ValidationError::MissingStorageRoot);
    }
    Ok(())
}
