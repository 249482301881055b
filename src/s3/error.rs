//! Error taxonomy of S3 operations

use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;
use crate::pool::{AdmissionError, PoolError};
use crate::xml::DecodeError;

/// Error document returned by the service with a non-success status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceError {
    pub status: u16,
    /// Error code such as `AccessDenied`; empty when the body had none
    pub code: String,
    pub message: String,
    pub resource: Option<String>,
    pub request_id: Option<String>,
}

impl ServiceError {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Transient server-side conditions worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code.as_str(),
            "RequestTimeout" | "InternalError" | "SlowDown" | "ServiceUnavailable"
        ) || matches!(self.status, 500 | 503)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.status)?;
        if !self.code.is_empty() {
            write!(f, " {}", self.code)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id {})", request_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}

/// How the retry layer treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Refused locally before any network activity
    Admission,
    /// Network or server condition that may clear up
    Transient,
    /// Retrying cannot help
    Fatal,
}

/// Terminal error of an S3 operation
#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    #[error("Admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Channel pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Transport error: {0}")]
    Transport(#[source] hyper::Error),

    #[error("Channel closed before a response was received")]
    ChannelInactive,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("S3 error: {0}")]
    Service(ServiceError),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] DecodeError),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Client is closed")]
    Closed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start worker runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl S3Error {
    /// Classify a hyper failure on an active channel
    pub fn from_hyper(err: hyper::Error) -> Self {
        if err.is_incomplete_message() || err.is_canceled() || err.is_closed() {
            S3Error::ChannelInactive
        } else {
            S3Error::Transport(err)
        }
    }

    pub fn retry_class(&self) -> RetryClass {
        match self {
            S3Error::Admission(_) => RetryClass::Admission,
            S3Error::Pool(PoolError::TooManyPendingAcquires(_)) => RetryClass::Admission,
            S3Error::Pool(PoolError::Closed) => RetryClass::Fatal,
            S3Error::Pool(_) => RetryClass::Transient,
            S3Error::Transport(_) | S3Error::ChannelInactive | S3Error::Timeout(_) => RetryClass::Transient,
            S3Error::Service(e) if e.is_transient() => RetryClass::Transient,
            S3Error::Service(_) => RetryClass::Fatal,
            S3Error::BodyTooLarge { .. }
            | S3Error::Decode(_)
            | S3Error::Cancelled
            | S3Error::Closed
            | S3Error::InvalidRequest(_)
            | S3Error::Config(_)
            | S3Error::Runtime(_) => RetryClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Fatal
    }

    /// The service error, if the failure came from an error document
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            S3Error::Service(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ServiceError> for S3Error {
    fn from(err: ServiceError) -> Self {
        S3Error::Service(err)
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn service(status: u16, code: &str) -> S3Error {
        S3Error::Service(ServiceError {
            status,
            code: code.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_service_error_classification() {
        assert_eq!(service(400, "RequestTimeout").retry_class(), RetryClass::Transient);
        assert_eq!(service(500, "InternalError").retry_class(), RetryClass::Transient);
        assert_eq!(service(503, "SlowDown").retry_class(), RetryClass::Transient);
        assert_eq!(service(500, "").retry_class(), RetryClass::Transient);
        assert_eq!(service(403, "AccessDenied").retry_class(), RetryClass::Fatal);
        assert_eq!(service(404, "NoSuchKey").retry_class(), RetryClass::Fatal);
    }

    #[test]
    fn test_local_error_classification() {
        let admission = S3Error::from(AdmissionError::LimitExceeded { limit: 1 });
        assert_eq!(admission.retry_class(), RetryClass::Admission);
        assert!(admission.is_retryable());

        let pending = S3Error::from(PoolError::TooManyPendingAcquires(10));
        assert_eq!(pending.retry_class(), RetryClass::Admission);

        let acquire = S3Error::from(PoolError::AcquireTimeout(Duration::from_secs(1)));
        assert_eq!(acquire.retry_class(), RetryClass::Transient);

        assert_eq!(S3Error::ChannelInactive.retry_class(), RetryClass::Transient);
        assert_eq!(S3Error::Timeout(Duration::from_secs(1)).retry_class(), RetryClass::Transient);
        assert_eq!(S3Error::from(PoolError::Closed).retry_class(), RetryClass::Fatal);
        assert!(!S3Error::Cancelled.is_retryable());
        assert!(!S3Error::Decode(DecodeError::Malformed("x".to_string())).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = ServiceError {
            status: 403,
            code: "AccessDenied".to_string(),
            message: "Access Denied".to_string(),
            resource: None,
            request_id: Some("r".to_string()),
        };
        assert_eq!(err.to_string(), "status 403 AccessDenied: Access Denied (request id r)");
    }
}
