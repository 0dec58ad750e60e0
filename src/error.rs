//! Unified error handling for the route-tracker library.
//!
//! Every failure the engine can observe is recoverable locally. Only
//! `start()` ever hands one back to the caller ([`TrackerError::UnsupportedPlatform`]);
//! the rest are logged, surfaced as advisory state, or absorbed by the
//! degraded-write policy of the route buffer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a position fix could not be obtained.
///
/// Fix errors never stop tracking; the platform watch keeps retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FixError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("timed out waiting for a position fix")]
    Timeout,
}

impl FixError {
    /// Map a W3C geolocation error code (1, 2, 3) onto a fix error.
    /// Unknown codes are treated as an unavailable position.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => FixError::PermissionDenied,
            3 => FixError::Timeout,
            _ => FixError::PositionUnavailable,
        }
    }
}

/// Unified error type for route-tracker operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    /// The platform offers no position source
    #[error("geolocation is not supported on this platform")]
    UnsupportedPlatform,

    /// A position fix failed
    #[error("unable to retrieve location: {0}")]
    Fix(#[from] FixError),

    /// The key/value store refused a write for lack of space
    #[error("persistent storage quota exceeded")]
    QuotaExceeded,

    /// A persisted value could not be decoded
    #[error("malformed persisted value under '{key}': {message}")]
    MalformedSnapshot { key: String, message: String },

    /// Any other storage failure
    #[error("storage error: {message}")]
    Storage { message: String },

    /// A save-route payload failed validation
    #[error("invalid route payload: {message}")]
    InvalidPayload { message: String },

    /// The save-route collaborator did not accept the route
    #[error("route was not saved: {message}")]
    SaveFailed { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The tracker task is no longer running
    #[error("tracker service has shut down")]
    ServiceClosed,
}

impl TrackerError {
    /// Whether the error came from the store running out of space.
    pub fn is_quota(&self) -> bool {
        matches!(self, TrackerError::QuotaExceeded)
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _) if e.code == rusqlite::ErrorCode::DiskFull => {
                TrackerError::QuotaExceeded
            }
            other => TrackerError::Storage {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for route-tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
