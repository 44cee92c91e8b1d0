//! Immutable time-tracking facts.
//!
//! A `TimeEvent` gets its `event_id` and `sequence_number` at creation,
//! before any network attempt. The remote side upserts by `event_id`, so
//! resending the same event is always safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEventKind {
    Enter,
    Exit,
    ClockIn,
    ClockOut,
    BreakStart,
    BreakEnd,
}

/// How the event was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMethod {
    Geofence,
    Manual,
}

/// Delivery state of an event relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

/// An immutable work-session fact.
///
/// `timestamp` is when the event happened in the real world (the geofence
/// callback time), never when it was processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEvent {
    /// Client-generated, globally unique.
    pub event_id: String,
    pub employee_id: String,
    pub job_site_id: String,
    pub session_id: String,
    /// Strictly increasing per session, assigned at creation.
    pub sequence_number: u64,
    pub kind: TimeEventKind,
    pub timestamp: DateTime<Utc>,
    pub method: RecordingMethod,
    pub sync_status: SyncState,
}

impl TimeEvent {
    /// Serialize the wire payload sent to the remote store.
    pub fn to_payload(&self) -> serde_json::Value {
        // Wire payload never carries local delivery state.
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.remove("sync_status");
        }
        value
    }
}
