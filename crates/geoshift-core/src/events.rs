//! Session state-change notifications.
//!
//! Distinct from [`crate::model::TimeEvent`]: time events are durable
//! facts bound for the remote store, these are ephemeral notices for
//! whoever is watching the session right now.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ScheduleSession, SessionStatus};

/// Every session state change produces a `SessionEvent`.
///
/// The worker broadcasts these on a channel; UI layers and integrations
/// subscribe instead of polling engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Geofence registered, session is watching for an enter.
    MonitoringArmed {
        session_id: String,
        region_id: String,
        at: DateTime<Utc>,
    },
    /// Enter observed but company policy wants explicit confirmation.
    ConfirmationRequested {
        session_id: String,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ClockedIn {
        session_id: String,
        /// The geofence event time, not the processing time.
        clocked_in_at: DateTime<Utc>,
        late: bool,
        at: DateTime<Utc>,
    },
    BreakStarted {
        session_id: String,
        at: DateTime<Utc>,
    },
    BreakEnded {
        session_id: String,
        break_secs: i64,
        at: DateTime<Utc>,
    },
    ClockedOut {
        session_id: String,
        clocked_out_at: DateTime<Utc>,
        work_secs: i64,
        at: DateTime<Utc>,
    },
    NoShowMarked {
        session_id: String,
        at: DateTime<Utc>,
    },
    /// Worked past expected hours plus tolerance; status unchanged.
    OvertimeFlagged {
        session_id: String,
        at: DateTime<Utc>,
    },
    /// Worked past the company hard cap; status is now `overtime`.
    OvertimeStatusEntered {
        session_id: String,
        at: DateTime<Utc>,
    },
    /// Session degraded to manual-only mode; needs a human.
    AttentionRequired {
        session_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    SessionCancelled {
        session_id: String,
        at: DateTime<Utc>,
    },
    /// Full state snapshot, emitted by the worker after every transition.
    Snapshot {
        session: ScheduleSession,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Session this event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::MonitoringArmed { session_id, .. }
            | SessionEvent::ConfirmationRequested { session_id, .. }
            | SessionEvent::ClockedIn { session_id, .. }
            | SessionEvent::BreakStarted { session_id, .. }
            | SessionEvent::BreakEnded { session_id, .. }
            | SessionEvent::ClockedOut { session_id, .. }
            | SessionEvent::NoShowMarked { session_id, .. }
            | SessionEvent::OvertimeFlagged { session_id, .. }
            | SessionEvent::OvertimeStatusEntered { session_id, .. }
            | SessionEvent::AttentionRequired { session_id, .. }
            | SessionEvent::SessionCancelled { session_id, .. } => session_id,
            SessionEvent::Snapshot { session, .. } => &session.session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serialization() {
        let ev = SessionEvent::NoShowMarked {
            session_id: "sess-1".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"NoShowMarked\""));
        assert_eq!(ev.session_id(), "sess-1");
    }

    #[test]
    fn snapshot_session_id() {
        let ev = SessionEvent::Snapshot {
            session: ScheduleSession {
                session_id: "sess-9".to_string(),
                schedule_id: "sch-1".to_string(),
                employee_id: "e1".to_string(),
                job_site_id: "site1".to_string(),
                status: SessionStatus::Scheduled,
                work_duration_secs: 0,
                break_duration_secs: 0,
                is_in_overtime: false,
                is_late: false,
                requires_attention: false,
            },
            at: Utc::now(),
        };
        assert_eq!(ev.session_id(), "sess-9");
    }
}
