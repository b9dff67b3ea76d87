//! Proxy error types

use thiserror::Error;
use uuid::Uuid;

use crate::error::ServiceError;

/// Error type for stream proxy operations
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Unknown device
    #[error("device not found: {0}")]
    DeviceNotFound(Uuid),
    /// Unknown profile on the device
    #[error("profile not found: {device}/{profile}")]
    ProfileNotFound {
        /// Device identifier
        device: Uuid,
        /// Requested profile token or label
        profile: String,
    },
    /// Upstream URL could not be parsed
    #[error("invalid upstream url: {0}")]
    InvalidUpstream(String),
}

impl From<ProxyError> for ServiceError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::DeviceNotFound(_) => ServiceError::NotFound("Device".into()),
            ProxyError::ProfileNotFound { .. } => ServiceError::NotFound("Profile".into()),
            ProxyError::InvalidUpstream(url) => ServiceError::UpstreamUnavailable(url),
        }
    }
}
