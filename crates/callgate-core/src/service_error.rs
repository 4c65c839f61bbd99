//! Structured errors raised by in-process service actions.
//!
//! A [`ServiceError`] carries a name, a human readable message, arbitrary
//! data, a retry hint, an optional wrapped cause and a numeric code. The
//! framework's built-in request-path errors use HTTP-like codes; application
//! code may instead assign a wire status code directly (see
//! [`StatusConfig::RESERVED_CODE_CEILING`](crate::config::StatusConfig)).
//!
//! [`ErrorSnapshot`] is the serialized form attached to failed wire responses.

use crate::error::CallgateError;
use crate::status::WireStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Names of the framework's built-in request-path errors.
pub mod kind {
    pub const SERVICE_NOT_FOUND: &str = "ServiceNotFoundError";
    pub const SERVICE_NOT_AVAILABLE: &str = "ServiceNotAvailableError";
    pub const REQUEST_TIMEOUT: &str = "RequestTimeoutError";
    pub const REQUEST_SKIPPED: &str = "RequestSkippedError";
    pub const REQUEST_REJECTED: &str = "RequestRejectedError";
    pub const QUEUE_IS_FULL: &str = "QueueIsFullError";
    pub const MAX_CALL_LEVEL: &str = "MaxCallLevelError";

    pub const VALIDATION: &str = "ValidationError";
    pub const INTERNAL: &str = "InternalError";
    pub const REMOTE: &str = "RemoteCallError";
}

/// In-process structured error.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{name}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_error: Option<Box<ServiceError>>,
    pub code: i32,
}

impl ServiceError {
    pub fn new(name: impl Into<String>, message: impl Into<String>, code: i32) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            data: Value::Null,
            retryable: false,
            internal_error: None,
            code,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_internal_error(mut self, cause: ServiceError) -> Self {
        self.internal_error = Some(Box::new(cause));
        self
    }

    pub fn service_not_found(action: &str, node_id: Option<&str>) -> Self {
        let message = match node_id {
            Some(node) => format!("Service '{}' is not found on '{}' node.", action, node),
            None => format!("Service '{}' is not found.", action),
        };
        Self::new(kind::SERVICE_NOT_FOUND, message, 404)
            .with_retryable(true)
            .with_data(json!({ "action": action, "nodeID": node_id }))
    }

    pub fn service_not_available(action: &str, node_id: Option<&str>) -> Self {
        let message = match node_id {
            Some(node) => format!("Service '{}' is not available on '{}' node.", action, node),
            None => format!("Service '{}' is not available.", action),
        };
        Self::new(kind::SERVICE_NOT_AVAILABLE, message, 404)
            .with_retryable(true)
            .with_data(json!({ "action": action, "nodeID": node_id }))
    }

    pub fn request_timeout(action: &str, node_id: &str) -> Self {
        Self::new(
            kind::REQUEST_TIMEOUT,
            format!(
                "Request is timed out when call '{}' action on '{}' node.",
                action, node_id
            ),
            504,
        )
        .with_retryable(true)
        .with_data(json!({ "action": action, "nodeID": node_id }))
    }

    pub fn request_skipped(action: &str, node_id: &str) -> Self {
        Self::new(
            kind::REQUEST_SKIPPED,
            format!(
                "Calling '{}' is skipped because timeout reached on '{}' node.",
                action, node_id
            ),
            514,
        )
        .with_data(json!({ "action": action, "nodeID": node_id }))
    }

    pub fn request_rejected(action: &str, node_id: &str) -> Self {
        Self::new(
            kind::REQUEST_REJECTED,
            format!(
                "Request is rejected when call '{}' action on '{}' node.",
                action, node_id
            ),
            503,
        )
        .with_retryable(true)
        .with_data(json!({ "action": action, "nodeID": node_id }))
    }

    pub fn queue_is_full(action: &str, node_id: &str, size: usize, limit: usize) -> Self {
        Self::new(
            kind::QUEUE_IS_FULL,
            format!(
                "Queue is full. Request '{}' action on '{}' node is rejected.",
                action, node_id
            ),
            429,
        )
        .with_retryable(true)
        .with_data(json!({ "action": action, "nodeID": node_id, "size": size, "limit": limit }))
    }

    pub fn max_call_level(node_id: &str, level: u32) -> Self {
        Self::new(
            kind::MAX_CALL_LEVEL,
            format!(
                "Request level is reached the limit ({}) on '{}' node.",
                level, node_id
            ),
            500,
        )
        .with_data(json!({ "level": level, "nodeID": node_id }))
    }
}

/// Serialized view of a [`ServiceError`] attached to failed wire responses.
///
/// The wrapped cause is always present in the payload, with every field
/// omitted when the error has no cause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(default)]
    pub internal_error: CauseSnapshot,
}

/// One level of wrapped cause inside an [`ErrorSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CauseSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

fn non_null(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}

impl From<&ServiceError> for ErrorSnapshot {
    fn from(err: &ServiceError) -> Self {
        let internal_error = err
            .internal_error
            .as_deref()
            .map(|cause| CauseSnapshot {
                name: Some(cause.name.clone()),
                message: Some(cause.message.clone()),
                data: non_null(&cause.data),
                retryable: Some(cause.retryable),
            })
            .unwrap_or_default();

        Self {
            name: Some(err.name.clone()),
            message: Some(err.message.clone()),
            data: non_null(&err.data),
            retryable: Some(err.retryable),
            internal_error,
        }
    }
}

impl ErrorSnapshot {
    /// Rebuild an in-process error from a remote snapshot.
    ///
    /// `code` is the wire status the remote replied with.
    pub fn into_service_error(self, code: i32, fallback_message: &str) -> ServiceError {
        let cause = self.internal_error.name.map(|name| {
            ServiceError::new(name, self.internal_error.message.unwrap_or_default(), code)
                .with_data(self.internal_error.data.unwrap_or(Value::Null))
                .with_retryable(self.internal_error.retryable.unwrap_or(false))
        });

        let mut err = ServiceError::new(
            self.name.unwrap_or_else(|| kind::REMOTE.to_string()),
            self.message.unwrap_or_else(|| fallback_message.to_string()),
            code,
        )
        .with_data(self.data.unwrap_or(Value::Null))
        .with_retryable(self.retryable.unwrap_or(false));
        err.internal_error = cause.map(Box::new);
        err
    }
}

impl From<CallgateError> for ServiceError {
    fn from(err: CallgateError) -> Self {
        match err {
            CallgateError::Service(service_err) => service_err,
            CallgateError::Remote(failure) => {
                let code = failure.status.code();
                match failure.error_snapshot() {
                    Some(snapshot) => snapshot.into_service_error(code, &failure.details),
                    None => ServiceError::new(kind::REMOTE, failure.details.clone(), code)
                        .with_retryable(failure.status == WireStatus::Unavailable),
                }
            }
            CallgateError::Connect { endpoint, message } => ServiceError::new(
                kind::SERVICE_NOT_AVAILABLE,
                format!("Endpoint '{}' is not available: {}", endpoint, message),
                404,
            )
            .with_retryable(true)
            .with_data(json!({ "endpoint": endpoint })),
            CallgateError::MalformedActionName { name } => ServiceError::new(
                kind::VALIDATION,
                format!("Malformed action name '{}'", name),
                422,
            )
            .with_data(json!({ "action": name })),
            other => ServiceError::new(kind::INTERNAL, other.to_string(), 500),
        }
    }
}
