//! Error types for callgate.
//!
//! `CallgateError` is what every routed call, wire exchange and bootstrap step
//! returns. In-process action failures are modelled separately by
//! [`ServiceError`](crate::service_error::ServiceError), which is the shape the
//! status translator understands.

use crate::service_error::ServiceError;
use crate::status::{WireFailure, WireStatus};
use thiserror::Error;

/// Main error type for callgate.
#[derive(Debug, Error)]
pub enum CallgateError {
    #[error("Malformed action name '{name}': expected 'version.service.action'")]
    MalformedActionName { name: String },

    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    /// The remote side answered with a non-OK wire status.
    #[error("Remote call failed with {}: {}", .0.status, .0.details)]
    Remote(WireFailure),

    /// An in-process action failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Redirect policy failed: {message}")]
    Policy { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Wire protocol error: {message}")]
    Protocol { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for callgate operations.
pub type Result<T> = std::result::Result<T, CallgateError>;

impl From<std::io::Error> for CallgateError {
    fn from(err: std::io::Error) -> Self {
        CallgateError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CallgateError {
    fn from(err: serde_json::Error) -> Self {
        CallgateError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl CallgateError {
    /// Wire status carried by a remote failure, if this is one.
    pub fn wire_status(&self) -> Option<WireStatus> {
        match self {
            CallgateError::Remote(failure) => Some(failure.status),
            _ => None,
        }
    }

    /// Whether the caller may reasonably retry.
    ///
    /// This layer never retries on its own; the hint is surfaced for the
    /// caller's retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallgateError::Remote(failure) => failure.is_retryable(),
            CallgateError::Service(err) => err.retryable,
            CallgateError::Connect { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CallMetadata;

    #[test]
    fn test_error_display() {
        let err = CallgateError::MalformedActionName {
            name: "users.get".into(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed action name 'users.get': expected 'version.service.action'"
        );
    }

    #[test]
    fn test_remote_error_display_includes_status() {
        let err = CallgateError::Remote(WireFailure::new(
            WireStatus::Unavailable,
            "backend down",
            CallMetadata::new(),
        ));
        assert_eq!(
            err.to_string(),
            "Remote call failed with UNAVAILABLE: backend down"
        );
        assert_eq!(err.wire_status(), Some(WireStatus::Unavailable));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(CallgateError::Connect {
            endpoint: "users-1:5000".into(),
            message: "refused".into()
        }
        .is_retryable());
        assert!(!CallgateError::MalformedActionName { name: "x".into() }.is_retryable());
        assert!(!CallgateError::Remote(WireFailure::new(
            WireStatus::InvalidArgument,
            "bad",
            CallMetadata::new()
        ))
        .is_retryable());
    }
}
