//! Live work-session state derived from one schedule occurrence.

use serde::{Deserialize, Serialize};

/// Runtime state of a tracked work session.
///
/// Exactly one non-terminal session exists per employee at any instant;
/// the engine enforces the transitions, this type just names the states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, geofence not yet armed.
    Scheduled,
    /// Geofence registered, waiting for an enter event.
    MonitoringActive,
    /// Enter observed but the company requires explicit confirmation.
    PendingConfirmation,
    ClockedIn,
    OnBreak,
    /// Worked past the company hard cap; still on the clock.
    Overtime,
    NoShow,
    Completed,
    Cancelled,
    Error,
}

impl SessionStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::NoShow
                | SessionStatus::Completed
                | SessionStatus::Cancelled
                | SessionStatus::Error
        )
    }

    /// States where the employee is on the clock.
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            SessionStatus::ClockedIn | SessionStatus::OnBreak | SessionStatus::Overtime
        )
    }
}

/// Snapshot of one employee's current or upcoming schedule occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSession {
    pub session_id: String,
    pub schedule_id: String,
    pub employee_id: String,
    pub job_site_id: String,
    pub status: SessionStatus,
    /// Accumulated on-the-clock time, excluding breaks.
    pub work_duration_secs: i64,
    /// Accumulated break time.
    pub break_duration_secs: i64,
    pub is_in_overtime: bool,
    pub is_late: bool,
    /// Set when the session degraded to manual-only mode or otherwise
    /// needs a human to look at it. Sticky until the session ends.
    pub requires_attention: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SessionStatus::NoShow.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
        assert!(!SessionStatus::ClockedIn.is_terminal());
        assert!(!SessionStatus::Overtime.is_terminal());
    }

    #[test]
    fn working_states() {
        assert!(SessionStatus::ClockedIn.is_working());
        assert!(SessionStatus::OnBreak.is_working());
        assert!(SessionStatus::Overtime.is_working());
        assert!(!SessionStatus::MonitoringActive.is_working());
    }

    #[test]
    fn status_wire_names_are_snake_case() {
        let json = serde_json::to_string(&SessionStatus::MonitoringActive).unwrap();
        assert_eq!(json, "\"monitoring_active\"");
    }
}
