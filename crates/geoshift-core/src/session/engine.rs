//! Session engine implementation.
//!
//! The engine is a wall-clock-free state machine: it owns no threads and
//! no timers. Region events carry their own timestamps and every other
//! operation takes an explicit `now`. Timer behavior (no-show, confirmation
//! expiry, exit grace) lives in `tick()`, which is a pure function of
//! elapsed time and event history -- calling it twice at the same instant
//! changes nothing.
//!
//! ## State Transitions
//!
//! ```text
//! Scheduled -> MonitoringActive -> [PendingConfirmation] -> ClockedIn <-> OnBreak
//!                                                              |
//!                                                           Overtime
//! Terminal: Completed, NoShow, Cancelled, Error
//! ```
//!
//! The serialized worker in [`crate::session::worker`] drives one engine
//! per session; callbacks may arrive from any thread, the worker orders them.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

use crate::config::{ConfirmationExpiry, LaborPolicy, TrackingConfig};
use crate::error::LocationError;
use crate::events::SessionEvent;
use crate::geofence::{GeofenceRegion, RegionEvent, RegionTransition};
use crate::model::{
    JobSite, RecordingMethod, Schedule, ScheduleSession, SessionStatus, SyncState, TimeEvent,
    TimeEventKind,
};

/// Duplicate-delivery window: two events for the same region and transition
/// within one bucket are the same physical crossing.
const DEDUP_BUCKET_SECS: i64 = 30;

/// Result of one engine operation: facts to enqueue plus notifications
/// for subscribers.
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub emitted: Vec<TimeEvent>,
    pub notices: Vec<SessionEvent>,
}

impl EngineOutput {
    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty() && self.notices.is_empty()
    }

    fn merge(&mut self, other: EngineOutput) {
        self.emitted.extend(other.emitted);
        self.notices.extend(other.notices);
    }
}

/// Per-employee state machine turning region events plus schedule data
/// into work-session transitions.
#[derive(Debug, Clone)]
pub struct SessionEngine {
    schedule: Schedule,
    site: JobSite,
    config: TrackingConfig,
    policy: LaborPolicy,
    session: ScheduleSession,
    next_sequence: u64,
    /// Last accepted event timestamp per region; older arrivals are rejected.
    last_accepted: HashMap<String, DateTime<Utc>>,
    /// Seen `(region, transition, bucket)` keys for duplicate suppression.
    seen_buckets: HashSet<(String, RegionTransition, i64)>,
    enter_seen: bool,
    /// Open work segment start (set while clocked in / overtime).
    work_segment_start: Option<DateTime<Utc>>,
    /// Open break segment start (set while on break).
    break_segment_start: Option<DateTime<Utc>>,
    accumulated_work: Duration,
    accumulated_break: Duration,
    /// Exit grace: (commit deadline, original exit time).
    grace: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Pending confirmation: (expiry deadline, original enter time).
    confirmation: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Geofence unusable; only manual actions drive this session.
    manual_only: bool,
    /// Worked past the hard cap; break round-trips land back in Overtime.
    over_cap: bool,
}

impl SessionEngine {
    /// Create an engine for one schedule occurrence. Starts in `Scheduled`.
    pub fn new(
        schedule: Schedule,
        site: JobSite,
        config: TrackingConfig,
        policy: LaborPolicy,
    ) -> Self {
        let session = ScheduleSession {
            session_id: uuid::Uuid::new_v4().to_string(),
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
        Self {
            schedule,
            site,
            config,
            policy,
            session,
            next_sequence: 1,
            last_accepted: HashMap::new(),
            seen_buckets: HashSet::new(),
            enter_seen: false,
            work_segment_start: None,
            break_segment_start: None,
            accumulated_work: Duration::zero(),
            accumulated_break: Duration::zero(),
            grace: None,
            confirmation: None,
            manual_only: false,
            over_cap: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn is_manual_only(&self) -> bool {
        self.manual_only
    }

    /// The region this session monitors.
    pub fn region(&self) -> GeofenceRegion {
        GeofenceRegion::for_site(&self.site)
    }

    /// Arming is due once `now` reaches `start - clock_in_buffer`.
    pub fn due_to_arm(&self, now: DateTime<Utc>) -> bool {
        self.session.status == SessionStatus::Scheduled
            && now >= self.schedule.start - self.config.clock_in_buffer()
    }

    /// Total on-the-clock time as of `now`, excluding breaks.
    pub fn worked(&self, now: DateTime<Utc>) -> Duration {
        let open = self
            .work_segment_start
            .map(|start| now - start)
            .unwrap_or_else(Duration::zero);
        self.accumulated_work + open
    }

    /// Total break time as of `now`.
    pub fn on_break(&self, now: DateTime<Utc>) -> Duration {
        let open = self
            .break_segment_start
            .map(|start| now - start)
            .unwrap_or_else(Duration::zero);
        self.accumulated_break + open
    }

    /// Live session snapshot, including open segments.
    pub fn snapshot(&self, now: DateTime<Utc>) -> ScheduleSession {
        let mut session = self.session.clone();
        session.work_duration_secs = self.worked(now).num_seconds();
        session.break_duration_secs = self.on_break(now).num_seconds();
        session
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// `Scheduled -> MonitoringActive`. The caller registers `region()`
    /// with the platform monitor first; a registration failure goes through
    /// `degrade_to_manual` instead and arming still proceeds so the no-show
    /// check keeps running.
    pub fn arm(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if self.session.status != SessionStatus::Scheduled {
            return out;
        }
        self.session.status = SessionStatus::MonitoringActive;
        out.notices.push(SessionEvent::MonitoringArmed {
            session_id: self.session.session_id.clone(),
            region_id: self.site.site_id.clone(),
            at: now,
        });
        out
    }

    /// Process one geofence callback. Duplicates and out-of-order arrivals
    /// are swallowed silently; they are not errors.
    pub fn handle_region(&mut self, event: &RegionEvent) -> EngineOutput {
        let mut out = EngineOutput::default();
        if self.session.status.is_terminal() || self.manual_only {
            return out;
        }
        if event.region_id != self.site.site_id {
            return out;
        }
        if !self.accept_region_event(event) {
            return out;
        }

        match event.transition {
            RegionTransition::Enter => out.merge(self.handle_enter(event.timestamp)),
            RegionTransition::Exit => self.handle_exit(event.timestamp),
        }
        out
    }

    /// Evaluate all time-based transitions at `now`. Idempotent.
    pub fn tick(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if self.session.status.is_terminal() {
            return out;
        }

        out.merge(self.check_no_show(now));
        out.merge(self.check_confirmation_expiry(now));
        out.merge(self.check_grace_expiry(now));
        out.merge(self.check_overtime(now));
        out
    }

    /// Manual break start: `ClockedIn | Overtime -> OnBreak`.
    pub fn start_break(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if !matches!(
            self.session.status,
            SessionStatus::ClockedIn | SessionStatus::Overtime
        ) {
            return out;
        }
        self.close_work_segment(now);
        self.break_segment_start = Some(now);
        self.session.status = SessionStatus::OnBreak;
        out.emitted
            .push(self.next_event(TimeEventKind::BreakStart, now, RecordingMethod::Manual));
        out.notices.push(SessionEvent::BreakStarted {
            session_id: self.session.session_id.clone(),
            at: now,
        });
        out
    }

    /// Manual break end: `OnBreak -> ClockedIn` (or back to `Overtime` past
    /// the hard cap).
    pub fn end_break(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if self.session.status != SessionStatus::OnBreak {
            return out;
        }
        let break_secs = self.close_break_segment(now);
        self.work_segment_start = Some(now);
        self.session.status = if self.over_cap {
            SessionStatus::Overtime
        } else {
            SessionStatus::ClockedIn
        };
        out.emitted
            .push(self.next_event(TimeEventKind::BreakEnd, now, RecordingMethod::Manual));
        out.notices.push(SessionEvent::BreakEnded {
            session_id: self.session.session_id.clone(),
            break_secs,
            at: now,
        });
        out
    }

    /// Manual clock-out. While on break this first synthesizes `break_end`,
    /// then `clock_out`, with consecutive sequence numbers -- break time is
    /// never left open.
    pub fn request_clock_out(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if !self.session.status.is_working() {
            return out;
        }
        out.merge(self.complete(now, RecordingMethod::Manual));
        out
    }

    /// Manual clock-in, for degraded sessions or supervisor overrides.
    /// Bypasses the buffer-window check.
    pub fn manual_clock_in(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if !matches!(
            self.session.status,
            SessionStatus::Scheduled
                | SessionStatus::MonitoringActive
                | SessionStatus::PendingConfirmation
        ) {
            return out;
        }
        self.confirmation = None;
        self.enter_seen = true;
        out.merge(self.commit_clock_in(now, RecordingMethod::Manual));
        out
    }

    /// Confirm a pending clock-in before the timeout fires.
    pub fn confirm_clock_in(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        let Some((_, entered_at)) = self.confirmation.take() else {
            return out;
        };
        if self.session.status != SessionStatus::PendingConfirmation {
            return out;
        }
        let _ = now; // The fact time is the original enter, not the tap.
        out.merge(self.commit_clock_in(entered_at, RecordingMethod::Geofence));
        out
    }

    /// Location failure: degrade to manual-only mode. Reported, not
    /// retried; the session keeps running on manual actions.
    pub fn degrade_to_manual(&mut self, error: &LocationError, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if self.session.status.is_terminal() {
            return out;
        }
        self.manual_only = true;
        self.session.requires_attention = true;
        self.grace = None;
        out.notices.push(SessionEvent::AttentionRequired {
            session_id: self.session.session_id.clone(),
            reason: error.to_string(),
            at: now,
        });
        out
    }

    /// Cancel monitoring. Stops future tracking only -- already-committed
    /// events are untouched.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if self.session.status.is_terminal() {
            return out;
        }
        self.close_work_segment(now);
        self.close_break_segment(now);
        self.grace = None;
        self.confirmation = None;
        self.session.status = SessionStatus::Cancelled;
        out.notices.push(SessionEvent::SessionCancelled {
            session_id: self.session.session_id.clone(),
            at: now,
        });
        out
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Duplicate and monotonicity filter. Returns true when the event is
    /// new and in order for its region.
    fn accept_region_event(&mut self, event: &RegionEvent) -> bool {
        if let Some(last) = self.last_accepted.get(&event.region_id) {
            if event.timestamp < *last {
                return false;
            }
        }
        let bucket = event.timestamp.timestamp().div_euclid(DEDUP_BUCKET_SECS);
        let key = (event.region_id.clone(), event.transition, bucket);
        if !self.seen_buckets.insert(key) {
            return false;
        }
        self.last_accepted
            .insert(event.region_id.clone(), event.timestamp);
        true
    }

    fn handle_enter(&mut self, at: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        match self.session.status {
            SessionStatus::MonitoringActive => {
                let window_start = self.schedule.start - self.config.clock_in_buffer();
                let window_end = self.schedule.end + self.config.clock_out_buffer();
                if at < window_start || at > window_end {
                    return out;
                }
                self.enter_seen = true;
                if self.config.requires_confirmation {
                    let expires_at = at + self.config.confirmation_timeout();
                    self.confirmation = Some((expires_at, at));
                    self.session.status = SessionStatus::PendingConfirmation;
                    out.notices.push(SessionEvent::ConfirmationRequested {
                        session_id: self.session.session_id.clone(),
                        expires_at,
                        at,
                    });
                } else {
                    out.merge(self.commit_clock_in(at, RecordingMethod::Geofence));
                }
            }
            SessionStatus::ClockedIn | SessionStatus::OnBreak | SessionStatus::Overtime => {
                // Re-enter during grace cancels the pending clock-out.
                // Flicker suppression: no event emitted.
                self.grace = None;
            }
            _ => {}
        }
        out
    }

    fn handle_exit(&mut self, at: DateTime<Utc>) {
        if self.session.status.is_working() && self.grace.is_none() {
            self.grace = Some((at + self.config.exit_grace(), at));
        }
    }

    fn commit_clock_in(&mut self, at: DateTime<Utc>, method: RecordingMethod) -> EngineOutput {
        let mut out = EngineOutput::default();
        self.session.status = SessionStatus::ClockedIn;
        self.session.is_late = at > self.schedule.start;
        self.work_segment_start = Some(at);
        out.emitted
            .push(self.next_event(TimeEventKind::ClockIn, at, method));
        out.notices.push(SessionEvent::ClockedIn {
            session_id: self.session.session_id.clone(),
            clocked_in_at: at,
            late: self.session.is_late,
            at,
        });
        out
    }

    /// Terminal clock-out at `at`, applying the break-sandwich rule.
    fn complete(&mut self, at: DateTime<Utc>, method: RecordingMethod) -> EngineOutput {
        let mut out = EngineOutput::default();
        if self.session.status == SessionStatus::OnBreak {
            let break_secs = self.close_break_segment(at);
            out.emitted
                .push(self.next_event(TimeEventKind::BreakEnd, at, method));
            out.notices.push(SessionEvent::BreakEnded {
                session_id: self.session.session_id.clone(),
                break_secs,
                at,
            });
        }
        self.close_work_segment(at);
        self.grace = None;
        self.session.status = SessionStatus::Completed;
        self.session.work_duration_secs = self.accumulated_work.num_seconds();
        self.session.break_duration_secs = self.accumulated_break.num_seconds();
        out.emitted
            .push(self.next_event(TimeEventKind::ClockOut, at, method));
        out.notices.push(SessionEvent::ClockedOut {
            session_id: self.session.session_id.clone(),
            clocked_out_at: at,
            work_secs: self.accumulated_work.num_seconds(),
            at,
        });
        out
    }

    fn check_no_show(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        let waiting = matches!(
            self.session.status,
            SessionStatus::Scheduled | SessionStatus::MonitoringActive
        );
        if waiting && !self.enter_seen && now > self.schedule.start + self.config.clock_in_buffer()
        {
            self.session.status = SessionStatus::NoShow;
            out.notices.push(SessionEvent::NoShowMarked {
                session_id: self.session.session_id.clone(),
                at: now,
            });
        }
        out
    }

    fn check_confirmation_expiry(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if self.session.status != SessionStatus::PendingConfirmation {
            return out;
        }
        let Some((deadline, entered_at)) = self.confirmation else {
            return out;
        };
        if now < deadline {
            return out;
        }
        self.confirmation = None;
        match self.config.on_confirmation_expiry {
            ConfirmationExpiry::ClockIn => {
                out.merge(self.commit_clock_in(entered_at, RecordingMethod::Geofence));
            }
            ConfirmationExpiry::NoShow => {
                self.session.status = SessionStatus::NoShow;
                out.notices.push(SessionEvent::NoShowMarked {
                    session_id: self.session.session_id.clone(),
                    at: now,
                });
            }
        }
        out
    }

    fn check_grace_expiry(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if !self.session.status.is_working() {
            return out;
        }
        let Some((deadline, exited_at)) = self.grace else {
            return out;
        };
        if now >= deadline {
            // The fact time is the exit, not the grace expiry.
            out.merge(self.complete(exited_at, RecordingMethod::Geofence));
        }
        out
    }

    fn check_overtime(&mut self, now: DateTime<Utc>) -> EngineOutput {
        let mut out = EngineOutput::default();
        if !self.session.status.is_working() {
            return out;
        }
        let worked = self.worked(now);
        let expected = Duration::minutes((self.schedule.expected_hours * 60.0) as i64);
        if !self.session.is_in_overtime && worked > expected + self.policy.overtime_tolerance() {
            self.session.is_in_overtime = true;
            out.notices.push(SessionEvent::OvertimeFlagged {
                session_id: self.session.session_id.clone(),
                at: now,
            });
        }
        let hard_cap = Duration::minutes((self.policy.hard_cap_hours * 60.0) as i64);
        if !self.over_cap && worked > hard_cap {
            self.over_cap = true;
            if self.session.status == SessionStatus::ClockedIn {
                self.session.status = SessionStatus::Overtime;
            }
            out.notices.push(SessionEvent::OvertimeStatusEntered {
                session_id: self.session.session_id.clone(),
                at: now,
            });
        }
        out
    }

    fn close_work_segment(&mut self, at: DateTime<Utc>) {
        if let Some(start) = self.work_segment_start.take() {
            if at > start {
                self.accumulated_work = self.accumulated_work + (at - start);
            }
        }
        self.session.work_duration_secs = self.accumulated_work.num_seconds();
    }

    /// Returns the closed segment's length in seconds.
    fn close_break_segment(&mut self, at: DateTime<Utc>) -> i64 {
        let mut closed = 0;
        if let Some(start) = self.break_segment_start.take() {
            if at > start {
                let segment = at - start;
                closed = segment.num_seconds();
                self.accumulated_break = self.accumulated_break + segment;
            }
        }
        self.session.break_duration_secs = self.accumulated_break.num_seconds();
        closed
    }

    fn next_event(
        &mut self,
        kind: TimeEventKind,
        timestamp: DateTime<Utc>,
        method: RecordingMethod,
    ) -> TimeEvent {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        TimeEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            employee_id: self.schedule.employee_id.clone(),
            job_site_id: self.schedule.job_site_id.clone(),
            session_id: self.session.session_id.clone(),
            sequence_number,
            kind,
            timestamp,
            method,
            sync_status: SyncState::Pending,
        }
    }
}
