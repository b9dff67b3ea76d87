//! Shared service error taxonomy
//!
//! Component-local errors (registry, broker, proxy) convert into this type
//! at the protocol boundary, where each variant maps onto a standard SOAP
//! fault. Fault reasons are generic on purpose: internal detail stays in the
//! logs, not on the wire.

use thiserror::Error;

/// Error type shared across the protocol surface
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Malformed or unsupported request
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Credentials missing or wrong
    #[error("not authorized")]
    NotAuthorized,
    /// Referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Entity already exists
    #[error("conflict: {0}")]
    Conflict(String),
    /// Topic expression not supported by the device
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
    /// Upstream stream source unreachable
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl ServiceError {
    /// SOAP 1.2 fault code (Sender for client mistakes, Receiver otherwise)
    pub fn fault_code(&self) -> &'static str {
        match self {
            ServiceError::UpstreamUnavailable(_) => "soap:Receiver",
            _ => "soap:Sender",
        }
    }

    /// ONVIF fault subcode
    pub fn fault_subcode(&self) -> &'static str {
        match self {
            ServiceError::InvalidRequest(_) => "ter:InvalidArgVal",
            ServiceError::NotAuthorized => "ter:NotAuthorized",
            ServiceError::NotFound(_) => "ter:NotFound",
            ServiceError::Conflict(_) => "ter:Conflict",
            ServiceError::InvalidTopic(_) => "ter:InvalidTopicExpressionFault",
            ServiceError::UpstreamUnavailable(_) => "ter:Action",
        }
    }

    /// Human-readable fault reason, safe to put on the wire
    pub fn fault_reason(&self) -> String {
        match self {
            ServiceError::InvalidRequest(detail) => format!("Invalid request: {}", detail),
            ServiceError::NotAuthorized => "Authentication failed".into(),
            ServiceError::NotFound(what) => format!("{} not found", what),
            ServiceError::Conflict(what) => format!("{} already exists", what),
            ServiceError::InvalidTopic(_) => "Topic expression not supported".into(),
            ServiceError::UpstreamUnavailable(_) => "Stream source unavailable".into(),
        }
    }
}

/// Result alias for operations surfacing service errors
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_code_split() {
        assert_eq!(ServiceError::NotAuthorized.fault_code(), "soap:Sender");
        assert_eq!(
            ServiceError::UpstreamUnavailable("rtsp://x".into()).fault_code(),
            "soap:Receiver"
        );
    }

    #[test]
    fn test_fault_reason_does_not_leak_upstream_url() {
        let err = ServiceError::UpstreamUnavailable("rtsp://10.0.0.5:554/secret".into());
        assert!(!err.fault_reason().contains("10.0.0.5"));
    }

    #[test]
    fn test_subcodes() {
        assert_eq!(
            ServiceError::InvalidTopic("x".into()).fault_subcode(),
            "ter:InvalidTopicExpressionFault"
        );
        assert_eq!(
            ServiceError::NotFound("Device".into()).fault_subcode(),
            "ter:NotFound"
        );
    }
}
