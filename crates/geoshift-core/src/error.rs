//! Core error types for geoshift-core.
//!
//! Location failures degrade a session to manual-only mode, sync failures
//! are retried then left queued; neither ever terminates a session.
//! Validation conflicts are deliberately not here -- they are data
//! (`ScheduleConflict`), returned, never raised.

use std::path::PathBuf;
use thiserror::Error;

/// Umbrella error type for geoshift-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Location monitoring errors
    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    /// Remote sync errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Batch execution refused because the preview carries blocking conflicts
    #[error("Batch blocked by {0} error-severity conflict(s)")]
    BatchBlocked(usize),

    /// Session worker channel closed or session already terminal
    #[error("Session '{session_id}' is not accepting commands: {reason}")]
    SessionUnavailable { session_id: String, reason: String },

    /// A second live session for one employee was refused
    #[error("Employee '{employee_id}' already has live session '{session_id}'")]
    SessionActive {
        employee_id: String,
        session_id: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Errors from the platform location monitor.
#[derive(Error, Debug, Clone)]
pub enum LocationError {
    /// The user revoked or never granted location permission
    #[error("Location permission denied")]
    PermissionDenied,

    /// The platform refused to register the geofence region
    #[error("Geofence registration failed for region '{region_id}': {message}")]
    RegistrationFailed { region_id: String, message: String },

    /// The monitor's event stream ended unexpectedly
    #[error("Location monitor subscription for region '{region_id}' closed")]
    SubscriptionClosed { region_id: String },
}

/// Errors from the remote store.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Request did not complete in time
    #[error("Network timeout after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    /// Remote-side idempotency or validation rejection
    #[error("Remote rejected event '{event_id}': {reason}")]
    Rejected { event_id: String, reason: String },

    /// Transport-level failure (offline, DNS, connection reset)
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Payload could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Rejections are permanent; retrying the same payload cannot help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Rejected { .. })
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
