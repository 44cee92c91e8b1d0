//! Session reconstruction from the event log.
//!
//! The remote consumer applies events by `sequence_number`, not arrival
//! order, so a sync batch delivered out of order cannot corrupt the
//! rebuilt session: sort, dedup, fold.

use std::collections::HashSet;

use crate::model::{Schedule, ScheduleSession, SessionStatus, TimeEvent, TimeEventKind};

/// Rebuild the final session state from its events.
///
/// Events are sorted by `sequence_number` and deduplicated by `event_id`
/// first, so any arrival permutation (including duplicates from idempotent
/// replay) folds to the same result.
pub fn replay_session(schedule: &Schedule, session_id: &str, events: &[TimeEvent]) -> ScheduleSession {
    let mut ordered: Vec<&TimeEvent> = events
        .iter()
        .filter(|ev| ev.session_id == session_id)
        .collect();
    ordered.sort_by_key(|ev| ev.sequence_number);

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_seqs: HashSet<u64> = HashSet::new();

    let mut session = ScheduleSession {
        session_id: session_id.to_string(),
        schedule_id: schedule.schedule_id.clone(),
        employee_id: schedule.employee_id.clone(),
        job_site_id: schedule.job_site_id.clone(),
        status: SessionStatus::Scheduled,
        work_duration_secs: 0,
        break_duration_secs: 0,
        is_in_overtime: false,
        is_late: false,
        requires_attention: false,
    };

    let mut work_secs = 0i64;
    let mut break_secs = 0i64;
    let mut work_open: Option<chrono::DateTime<chrono::Utc>> = None;
    let mut break_open: Option<chrono::DateTime<chrono::Utc>> = None;

    for ev in ordered {
        if !seen_ids.insert(ev.event_id.as_str()) {
            continue;
        }
        if !seen_seqs.insert(ev.sequence_number) {
            // Two distinct ids claiming one sequence slot; first wins.
            continue;
        }
        match ev.kind {
            TimeEventKind::ClockIn => {
                session.status = SessionStatus::ClockedIn;
                session.is_late = ev.timestamp > schedule.start;
                work_open = Some(ev.timestamp);
            }
            TimeEventKind::BreakStart => {
                if let Some(start) = work_open.take() {
                    work_secs += (ev.timestamp - start).num_seconds().max(0);
                }
                break_open = Some(ev.timestamp);
                session.status = SessionStatus::OnBreak;
            }
            TimeEventKind::BreakEnd => {
                if let Some(start) = break_open.take() {
                    break_secs += (ev.timestamp - start).num_seconds().max(0);
                }
                work_open = Some(ev.timestamp);
                session.status = SessionStatus::ClockedIn;
            }
            TimeEventKind::ClockOut => {
                if let Some(start) = break_open.take() {
                    break_secs += (ev.timestamp - start).num_seconds().max(0);
                }
                if let Some(start) = work_open.take() {
                    work_secs += (ev.timestamp - start).num_seconds().max(0);
                }
                session.status = SessionStatus::Completed;
            }
            // Raw region crossings are context, not transitions.
            TimeEventKind::Enter | TimeEventKind::Exit => {}
        }
    }

    session.work_duration_secs = work_secs;
    session.break_duration_secs = break_secs;
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordingMethod, ScheduleStatus, ShiftType, SyncState};
    use chrono::{TimeZone, Utc};

    fn schedule() -> Schedule {
        Schedule {
            schedule_id: "sch-1".to_string(),
            employee_id: "emp-1".to_string(),
            job_site_id: "site-1".to_string(),
            start: Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap(),
            shift_type: ShiftType::Regular,
            status: ScheduleStatus::Scheduled,
            break_duration_minutes: 30,
            expected_hours: 8.0,
            recurrence: None,
        }
    }

    fn event(seq: u64, kind: TimeEventKind, h: u32, m: u32) -> TimeEvent {
        TimeEvent {
            event_id: format!("ev-{seq}"),
            employee_id: "emp-1".to_string(),
            job_site_id: "site-1".to_string(),
            session_id: "sess-1".to_string(),
            sequence_number: seq,
            kind,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap(),
            method: RecordingMethod::Geofence,
            sync_status: SyncState::Pending,
        }
    }

    fn full_day() -> Vec<TimeEvent> {
        vec![
            event(1, TimeEventKind::ClockIn, 9, 0),
            event(2, TimeEventKind::BreakStart, 12, 0),
            event(3, TimeEventKind::BreakEnd, 12, 30),
            event(4, TimeEventKind::ClockOut, 17, 0),
        ]
    }

    #[test]
    fn replay_in_order() {
        let session = replay_session(&schedule(), "sess-1", &full_day());
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.work_duration_secs, (3 * 60 + 4 * 60 + 30) * 60);
        assert_eq!(session.break_duration_secs, 30 * 60);
        assert!(!session.is_late);
    }

    #[test]
    fn replay_is_arrival_order_independent() {
        let mut shuffled = full_day();
        shuffled.reverse();
        let a = replay_session(&schedule(), "sess-1", &full_day());
        let b = replay_session(&schedule(), "sess-1", &shuffled);
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_event_ids_fold_once() {
        let mut events = full_day();
        events.push(event(1, TimeEventKind::ClockIn, 9, 0));
        let a = replay_session(&schedule(), "sess-1", &full_day());
        let b = replay_session(&schedule(), "sess-1", &events);
        assert_eq!(a, b);
    }

    #[test]
    fn foreign_session_events_ignored() {
        let mut events = full_day();
        let mut foreign = event(1, TimeEventKind::ClockOut, 10, 0);
        foreign.session_id = "other".to_string();
        foreign.event_id = "other-ev".to_string();
        events.push(foreign);
        let session = replay_session(&schedule(), "sess-1", &events);
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.break_duration_secs, 30 * 60);
    }
}
