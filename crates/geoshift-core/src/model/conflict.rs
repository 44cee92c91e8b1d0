//! Schedule conflicts reported by the validator.
//!
//! Conflicts are data, not errors: the validator never fails, it describes
//! what it found and lets the caller decide to block or warn.

use serde::{Deserialize, Serialize};

/// Kind of conflict. Wire names match the admin UI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    Overlap,
    RestPeriodViolation,
    MaxHoursExceeded,
    DoubleBooking,
}

/// Severity ordering matters: `Error` sorts before `Warning` and blocks
/// commit under a strict execution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Error,
    Warning,
}

/// One detected conflict between schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConflict {
    pub conflict_id: String,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub message: String,
    pub affected_schedule_ids: Vec<String>,
    pub employee_id: String,
}

impl ScheduleConflict {
    pub fn is_blocking(&self) -> bool {
        self.severity == ConflictSeverity::Error
    }

    /// Whether this conflict touches the given schedule.
    pub fn affects(&self, schedule_id: &str) -> bool {
        self.affected_schedule_ids.iter().any(|id| id == schedule_id)
    }
}
