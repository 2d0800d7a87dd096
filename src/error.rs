use serde::Serialize;
use thiserror::Error;

/// Failure categories reported by a position sensor.
///
/// The numeric codes follow the W3C Geolocation API (`1` denied,
/// `2` unavailable, `3` timeout).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SensorErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unknown(u16),
}

impl SensorErrorKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => SensorErrorKind::PermissionDenied,
            2 => SensorErrorKind::PositionUnavailable,
            3 => SensorErrorKind::Timeout,
            other => SensorErrorKind::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            SensorErrorKind::PermissionDenied => 1,
            SensorErrorKind::PositionUnavailable => 2,
            SensorErrorKind::Timeout => 3,
            SensorErrorKind::Unknown(code) => *code,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("sensor error {code} ({kind:?}): {message}", code = .kind.code())]
pub struct SensorError {
    pub kind: SensorErrorKind,
    pub message: String,
}

impl SensorError {
    pub fn new(kind: SensorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_code(code: u16, message: impl Into<String>) -> Self {
        Self::new(SensorErrorKind::from_code(code), message)
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            SensorErrorKind::Timeout,
            format!("no fix within {timeout_ms}ms"),
        )
    }
}

/// Errors surfaced by acquisition and geofence evaluation.
///
/// `Display` output is meant to be shown to the user as-is.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum LocationError {
    #[error("Geolocation is not supported on this device")]
    SensorUnsupported,
    #[error("Location access was denied by the user")]
    PermissionDenied,
    #[error("Location information is unavailable: {0}")]
    PositionUnavailable(String),
    #[error("Location request timed out after {attempts} attempt(s) (last timeout {timeout_ms}ms)")]
    Timeout { attempts: u32, timeout_ms: u64 },
    #[error("Unknown location error ({code}): {message}")]
    Unknown { code: u16, message: String },
    #[error("Failed to check geofence status: {0}")]
    RemoteEvaluationFailed(String),
    #[error("Failed to load office locations: {0}")]
    DirectoryUnavailable(String),
    #[error("No position has been acquired yet")]
    NoPosition,
    #[error("Location request was superseded by a newer request")]
    Superseded,
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

impl LocationError {
    /// Maps a terminal sensor failure onto the user-facing error.
    pub fn from_sensor(err: SensorError, attempts: u32, timeout_ms: u64) -> Self {
        match err.kind {
            SensorErrorKind::PermissionDenied => LocationError::PermissionDenied,
            SensorErrorKind::PositionUnavailable => LocationError::PositionUnavailable(err.message),
            SensorErrorKind::Timeout => LocationError::Timeout {
                attempts,
                timeout_ms,
            },
            SensorErrorKind::Unknown(code) => LocationError::Unknown {
                code,
                message: err.message,
            },
        }
    }

    /// Whether the host should offer a plain retry of the same action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocationError::Timeout { .. }
                | LocationError::RemoteEvaluationFailed(_)
                | LocationError::DirectoryUnavailable(_)
                | LocationError::Superseded
        )
    }
}
