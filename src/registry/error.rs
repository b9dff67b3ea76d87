//! Registry error types

use thiserror::Error;
use uuid::Uuid;

use crate::error::ServiceError;

/// Error type for registry operations
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No device with the given identifier
    #[error("device not found: {0}")]
    NotFound(Uuid),
    /// A device with the given identifier already exists
    #[error("device already exists: {0}")]
    Conflict(Uuid),
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => ServiceError::NotFound("Device".into()),
            RegistryError::Conflict(id) => ServiceError::Conflict(format!("Device {}", id)),
        }
    }
}
