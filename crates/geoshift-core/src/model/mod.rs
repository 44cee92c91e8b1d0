//! Domain types shared across the engine, sync layer, validator, and planner.

mod conflict;
mod event;
mod schedule;
mod session;

pub use conflict::{ConflictKind, ConflictSeverity, ScheduleConflict};
pub use event::{RecordingMethod, SyncState, TimeEvent, TimeEventKind};
pub use schedule::{
    JobSite, RecurrenceFrequency, RecurrenceRule, Schedule, ScheduleStatus, ShiftType,
};
pub use session::{ScheduleSession, SessionStatus};
