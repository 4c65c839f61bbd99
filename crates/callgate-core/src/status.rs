//! Wire status codes and translation of in-process errors into them.
//!
//! The translation table re-expresses the operational intent of the
//! framework's request-path errors (missing target, overload, timeouts) in
//! the wire vocabulary so remote callers can apply standard RPC handling.
//!
//! Timeout kinds map to DEADLINE_EXCEEDED, which leaves the remote side in
//! an undefined state: the request may have completed while its response was
//! lost. Both sides of the boundary can time out the same call independently
//! and nothing here reconciles the two views.

use crate::config::{StatusConfig, WireConfig};
use crate::metadata::{CallMetadata, ERROR_KEY};
use crate::service_error::{kind, ErrorSnapshot, ServiceError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::warn;

/// Standard wire status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum WireStatus {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl WireStatus {
    /// Highest standard status value.
    pub const MAX: WireStatus = WireStatus::Unauthenticated;

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            0 => WireStatus::Ok,
            1 => WireStatus::Cancelled,
            2 => WireStatus::Unknown,
            3 => WireStatus::InvalidArgument,
            4 => WireStatus::DeadlineExceeded,
            5 => WireStatus::NotFound,
            6 => WireStatus::AlreadyExists,
            7 => WireStatus::PermissionDenied,
            8 => WireStatus::ResourceExhausted,
            9 => WireStatus::FailedPrecondition,
            10 => WireStatus::Aborted,
            11 => WireStatus::OutOfRange,
            12 => WireStatus::Unimplemented,
            13 => WireStatus::Internal,
            14 => WireStatus::Unavailable,
            15 => WireStatus::DataLoss,
            16 => WireStatus::Unauthenticated,
            _ => return None,
        };
        Some(status)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WireStatus::Ok => "OK",
            WireStatus::Cancelled => "CANCELLED",
            WireStatus::Unknown => "UNKNOWN",
            WireStatus::InvalidArgument => "INVALID_ARGUMENT",
            WireStatus::DeadlineExceeded => "DEADLINE_EXCEEDED",
            WireStatus::NotFound => "NOT_FOUND",
            WireStatus::AlreadyExists => "ALREADY_EXISTS",
            WireStatus::PermissionDenied => "PERMISSION_DENIED",
            WireStatus::ResourceExhausted => "RESOURCE_EXHAUSTED",
            WireStatus::FailedPrecondition => "FAILED_PRECONDITION",
            WireStatus::Aborted => "ABORTED",
            WireStatus::OutOfRange => "OUT_OF_RANGE",
            WireStatus::Unimplemented => "UNIMPLEMENTED",
            WireStatus::Internal => "INTERNAL",
            WireStatus::Unavailable => "UNAVAILABLE",
            WireStatus::DataLoss => "DATA_LOSS",
            WireStatus::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for WireStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Numeric on the wire; codes outside the standard range read as UNKNOWN.
impl Serialize for WireStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for WireStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        Ok(WireStatus::from_code(code).unwrap_or(WireStatus::Unknown))
    }
}

/// Known in-process error kinds and the wire status each maps to.
const STATUS_TABLE: &[(&str, WireStatus)] = &[
    (kind::SERVICE_NOT_FOUND, WireStatus::Unimplemented),
    (kind::SERVICE_NOT_AVAILABLE, WireStatus::Unavailable),
    (kind::REQUEST_TIMEOUT, WireStatus::DeadlineExceeded),
    (kind::REQUEST_SKIPPED, WireStatus::DeadlineExceeded),
    (kind::REQUEST_REJECTED, WireStatus::Unavailable),
    (kind::QUEUE_IS_FULL, WireStatus::Unavailable),
    (kind::MAX_CALL_LEVEL, WireStatus::Internal),
];

/// Look up the wire status for an error kind name. Never fails; unknown
/// kinds yield `None`.
pub fn wire_status_for_kind(name: &str) -> Option<WireStatus> {
    STATUS_TABLE
        .iter()
        .find(|(kind, _)| *kind == name)
        .map(|(_, status)| *status)
}

/// Translate an in-process error to its wire status, if its kind is known.
pub fn to_wire_status(error: &ServiceError) -> Option<WireStatus> {
    wire_status_for_kind(&error.name)
}

/// How the wire status for a failed action was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusResolution {
    /// The error's code was already in the reserved wire range.
    Preassigned(WireStatus),
    /// The error kind was found in the translation table.
    Translated(WireStatus),
    /// Application code with no known mapping.
    Unmapped,
}

impl StatusResolution {
    pub fn status(self) -> WireStatus {
        match self {
            StatusResolution::Preassigned(status) | StatusResolution::Translated(status) => status,
            StatusResolution::Unmapped => WireStatus::Unknown,
        }
    }
}

/// Decide the wire status for an in-process error.
///
/// Codes at or below the reserved ceiling are kept as they are (values in
/// the ceiling range that are not standard statuses read as UNKNOWN); codes
/// above it go through the translation table.
pub fn resolve_wire_status(error: &ServiceError) -> StatusResolution {
    if error.code > StatusConfig::RESERVED_CODE_CEILING {
        return match to_wire_status(error) {
            Some(status) => StatusResolution::Translated(status),
            None => StatusResolution::Unmapped,
        };
    }
    StatusResolution::Preassigned(WireStatus::from_code(error.code).unwrap_or(WireStatus::Unknown))
}

/// A failed unary exchange as seen on the wire.
///
/// Produced by the inbound adapter from an in-process error and surfaced to
/// outbound callers as [`CallgateError::Remote`](crate::CallgateError::Remote).
#[derive(Debug, Clone, PartialEq)]
pub struct WireFailure {
    pub status: WireStatus,
    /// Succinct description of the error.
    pub details: String,
    pub metadata: CallMetadata,
}

impl WireFailure {
    pub fn new(status: WireStatus, details: impl Into<String>, metadata: CallMetadata) -> Self {
        Self {
            status,
            details: details.into(),
            metadata,
        }
    }

    /// Build the failure description for an in-process error with an
    /// already-resolved status.
    pub fn from_service_error(error: &ServiceError, status: WireStatus) -> Self {
        let mut metadata = CallMetadata::new();
        match serde_json::to_string(&ErrorSnapshot::from(error)) {
            Ok(serialized) => metadata.insert(ERROR_KEY, serialized),
            Err(e) => warn!("Failed to serialize '{}' for wire metadata: {}", error.name, e),
        }
        metadata.set_idempotent(error.retryable);

        Self::new(status, error.message.clone(), metadata)
    }

    /// The remote's structured error, if it attached one.
    pub fn error_snapshot(&self) -> Option<ErrorSnapshot> {
        self.metadata
            .get(ERROR_KEY)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// A smaller version of this failure, or `None` when nothing is left to
    /// drop.
    ///
    /// Each step keeps the status and the idempotent hint and drops, in
    /// order: snapshot data, the snapshot itself, any other metadata, and
    /// finally everything in `details` past `MAX_FAILURE_DETAILS`.
    pub fn reduced(&self) -> Option<WireFailure> {
        if let Some(mut snapshot) = self.error_snapshot() {
            if snapshot.data.is_some() || snapshot.internal_error.data.is_some() {
                snapshot.data = None;
                snapshot.internal_error.data = None;
                if let Ok(serialized) = serde_json::to_string(&snapshot) {
                    let mut reduced = self.clone();
                    reduced.metadata.insert(ERROR_KEY, serialized);
                    return Some(reduced);
                }
            }
        }

        if self.metadata.contains_key(ERROR_KEY) {
            let mut reduced = self.clone();
            reduced.metadata.remove(ERROR_KEY);
            return Some(reduced);
        }

        if !self.metadata.is_empty() {
            let mut metadata = CallMetadata::new();
            metadata.set_idempotent(self.metadata.is_idempotent());
            return Some(Self::new(self.status, self.details.clone(), metadata));
        }

        if self.details.len() > WireConfig::MAX_FAILURE_DETAILS {
            let mut end = WireConfig::MAX_FAILURE_DETAILS;
            while !self.details.is_char_boundary(end) {
                end -= 1;
            }
            return Some(Self::new(
                self.status,
                &self.details[..end],
                self.metadata.clone(),
            ));
        }

        None
    }

    pub fn is_retryable(&self) -> bool {
        self.status == WireStatus::Unavailable
            || self.metadata.is_idempotent()
            || self
                .error_snapshot()
                .and_then(|snapshot| snapshot.retryable)
                .unwrap_or(false)
    }
}

/// Translate an in-process error into the failure sent back over the wire.
pub fn translate_failure(error: &ServiceError) -> WireFailure {
    WireFailure::from_service_error(error, resolve_wire_status(error).status())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_table() {
        let cases = [
            ("ServiceNotFoundError", WireStatus::Unimplemented),
            ("ServiceNotAvailableError", WireStatus::Unavailable),
            ("RequestTimeoutError", WireStatus::DeadlineExceeded),
            ("RequestSkippedError", WireStatus::DeadlineExceeded),
            ("RequestRejectedError", WireStatus::Unavailable),
            ("QueueIsFullError", WireStatus::Unavailable),
            ("MaxCallLevelError", WireStatus::Internal),
        ];
        for (name, expected) in cases {
            assert_eq!(wire_status_for_kind(name), Some(expected), "{}", name);
        }
    }

    #[test]
    fn test_unknown_kind_has_no_mapping() {
        assert_eq!(wire_status_for_kind("ValidationError"), None);
        assert_eq!(wire_status_for_kind(""), None);
        let err = ServiceError::new("SomethingCustom", "custom", 500);
        assert_eq!(to_wire_status(&err), None);
        assert_eq!(resolve_wire_status(&err), StatusResolution::Unmapped);
        assert_eq!(resolve_wire_status(&err).status(), WireStatus::Unknown);
    }

    #[test]
    fn test_low_codes_bypass_translation() {
        // Name would translate to UNIMPLEMENTED, but the code is a wire status already.
        let err = ServiceError::new("ServiceNotFoundError", "missing", 5);
        assert_eq!(
            resolve_wire_status(&err),
            StatusResolution::Preassigned(WireStatus::NotFound)
        );
    }

    #[test]
    fn test_ceiling_range_outside_standard_reads_unknown() {
        let err = ServiceError::new("OddError", "odd", StatusConfig::RESERVED_CODE_CEILING);
        assert_eq!(
            resolve_wire_status(&err),
            StatusResolution::Preassigned(WireStatus::Unknown)
        );
    }

    #[test]
    fn test_translate_failure_builds_metadata() {
        let err = ServiceError::request_rejected("1.users.get", "node-1");
        let failure = translate_failure(&err);

        assert_eq!(failure.status, WireStatus::Unavailable);
        assert_eq!(failure.details, err.message);
        assert!(failure.metadata.is_idempotent());

        let snapshot = failure.error_snapshot().unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("RequestRejectedError"));
        assert_eq!(snapshot.retryable, Some(true));
    }

    #[test]
    fn test_translate_failure_does_not_touch_the_error() {
        let err = ServiceError::new("ServiceNotFoundError", "missing", 404);
        let before = err.clone();
        let _ = translate_failure(&err);
        assert_eq!(err, before);
    }

    #[test]
    fn test_reduced_drops_snapshot_data_first() {
        let err = ServiceError::new("ValidationError", "bad", 422)
            .with_data(serde_json::json!({"blob": "x".repeat(1000)}))
            .with_retryable(true);
        let failure = translate_failure(&err);

        let reduced = failure.reduced().unwrap();
        assert_eq!(reduced.status, WireStatus::Unknown);
        assert_eq!(reduced.details, "bad");
        assert!(reduced.metadata.is_idempotent());
        let snapshot = reduced.error_snapshot().unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("ValidationError"));
        assert_eq!(snapshot.data, None);

        let without_snapshot = reduced.reduced().unwrap();
        assert!(without_snapshot.error_snapshot().is_none());
        assert!(without_snapshot.metadata.is_idempotent());
        assert_eq!(without_snapshot.reduced(), None);
    }

    #[test]
    fn test_reduced_truncates_long_details_last() {
        let details = "é".repeat(WireConfig::MAX_FAILURE_DETAILS);
        let failure = WireFailure::new(WireStatus::Internal, details, CallMetadata::new());

        let reduced = failure.reduced().unwrap();
        assert!(reduced.details.len() <= WireConfig::MAX_FAILURE_DETAILS);
        assert!(reduced.details.chars().all(|c| c == 'é'));
        assert_eq!(reduced.reduced(), None);
    }

    #[test]
    fn test_status_codes_roundtrip() {
        for code in 0..=WireStatus::MAX.code() {
            let status = WireStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(WireStatus::from_code(17), None);
        assert_eq!(WireStatus::from_code(-1), None);
    }

    #[test]
    fn test_status_deserializes_unknown_codes_as_unknown() {
        let status: WireStatus = serde_json::from_str("99").unwrap();
        assert_eq!(status, WireStatus::Unknown);
        assert_eq!(serde_json::to_string(&WireStatus::Unavailable).unwrap(), "14");
    }
}
