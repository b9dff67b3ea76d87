//! Event broker error types

use thiserror::Error;
use uuid::Uuid;

use crate::error::ServiceError;

/// Error type for broker operations
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Unknown device
    #[error("device not found: {0}")]
    DeviceNotFound(Uuid),
    /// Unknown or expired subscription
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(Uuid),
    /// Topic not enabled on the device
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
    /// Pull issued against a push subscription
    #[error("subscription {0} is not a pull point")]
    NotPullPoint(Uuid),
}

impl From<BrokerError> for ServiceError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::DeviceNotFound(_) => ServiceError::NotFound("Device".into()),
            BrokerError::SubscriptionNotFound(_) => ServiceError::NotFound("Subscription".into()),
            BrokerError::InvalidTopic(topic) => ServiceError::InvalidTopic(topic),
            BrokerError::NotPullPoint(_) => {
                ServiceError::InvalidRequest("subscription is not a pull point".into())
            }
        }
    }
}
