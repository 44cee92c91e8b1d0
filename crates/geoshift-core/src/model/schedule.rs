//! Planned shift schedules and job sites.
//!
//! Schedules are owned by the admin side; the session engine only reads
//! them. All timestamps are UTC and serialize as ISO-8601.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of shift being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    Regular,
    Overtime,
    Emergency,
    Training,
}

/// Lifecycle state of a planned schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

/// How often a recurring schedule repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
}

/// Recurrence rule attached to a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: RecurrenceFrequency,
    /// Every `interval` days/weeks. 1 = every occurrence.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Last date the rule generates occurrences for, inclusive.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

fn default_interval() -> u32 {
    1
}

/// A planned work shift for one employee at one job site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: String,
    pub employee_id: String,
    pub job_site_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub shift_type: ShiftType,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub break_duration_minutes: u32,
    pub expected_hours: f64,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
}

impl Schedule {
    /// Half-open interval intersection: `[start, end)` ranges touch-but-not-
    /// overlap schedules (back-to-back shifts) are not overlapping.
    pub fn overlaps(&self, other: &Schedule) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Scheduled duration in fractional hours.
    pub fn scheduled_hours(&self) -> f64 {
        (self.end - self.start).num_minutes() as f64 / 60.0
    }

    /// Cancelled schedules are invisible to conflict checks.
    pub fn counts_for_conflicts(&self) -> bool {
        self.status != ScheduleStatus::Cancelled
    }
}

/// A geofenced work location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSite {
    pub site_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    /// Maximum concurrent scheduled employees, if the site enforces one.
    #[serde(default)]
    pub capacity: Option<u32>,
}
