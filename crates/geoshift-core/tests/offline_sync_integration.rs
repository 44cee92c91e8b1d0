//! Integration tests for offline capture and later sync.
//!
//! An engine clocks in while the device has no connectivity; the events
//! sit in the queue with their original timestamps and drain once the
//! store comes back, exactly once, in order.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use geoshift_core::{
    replay_session, BackoffPolicy, JobSite, LaborPolicy, OfflineEventQueue, RecordingMethod,
    RegionEvent, RegionTransition, RemoteStore, Schedule, ScheduleStatus, SessionEngine,
    SessionStatus, ShiftType, SyncCoordinator, SyncError, SyncState, TimeEvent, TimeEventKind,
    TrackingConfig,
};

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

fn site() -> JobSite {
    JobSite {
        site_id: "site-1".to_string(),
        name: "Main".to_string(),
        latitude: 40.71,
        longitude: -74.0,
        radius_meters: 100.0,
        capacity: None,
    }
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
}

/// In-memory document store with a connectivity switch.
#[derive(Default)]
struct MemoryStore {
    offline: AtomicBool,
    documents: Mutex<HashMap<String, serde_json::Value>>,
    upsert_calls: Mutex<HashMap<String, u32>>,
}

impl MemoryStore {
    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn document(&self, id: &str) -> Option<serde_json::Value> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    fn calls_for(&self, id: &str) -> u32 {
        self.upsert_calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn upsert(
        &self,
        _collection: &str,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<(), SyncError> {
        *self
            .upsert_calls
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert(0) += 1;
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable("no route to host".to_string()));
        }
        self.documents.lock().unwrap().insert(id.to_string(), payload);
        Ok(())
    }

    async fn query(
        &self,
        _collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<serde_json::Value>, SyncError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|doc| doc.get(field).and_then(|v| v.as_str()) == Some(value))
            .cloned()
            .collect())
    }
}

#[tokio::test]
async fn test_offline_clock_in_syncs_with_original_timestamp() {
    // 08:55 enter while the device has no connectivity.
    let mut engine = SessionEngine::new(
        schedule(),
        site(),
        TrackingConfig::default(),
        LaborPolicy::default(),
    );
    engine.arm(at(8, 50));
    let out = engine.handle_region(&RegionEvent {
        region_id: "site-1".to_string(),
        transition: RegionTransition::Enter,
        timestamp: at(8, 55),
    });
    assert_eq!(out.emitted.len(), 1);
    let event_id = out.emitted[0].event_id.clone();

    let dir = tempfile::TempDir::new().unwrap();
    let mut queue = OfflineEventQueue::new_with_path(dir.path().join("queue.json"));
    for event in out.emitted {
        assert!(queue.enqueue(event));
    }
    let queue = Arc::new(tokio::sync::Mutex::new(queue));

    let store = Arc::new(MemoryStore::default());
    store.set_offline(true);
    let coordinator = SyncCoordinator::new(store.clone(), queue.clone())
        .with_backoff(BackoffPolicy::default());

    // 09:00: still offline, the event stays queued for retry.
    let report = coordinator.run_once(at(9, 0)).await;
    assert_eq!(report.failed, 1);
    assert_eq!(store.document_count(), 0);
    assert_eq!(queue.lock().await.pending_count(), 1);

    // Backoff gates the retry; an immediate pass sends nothing.
    let report = coordinator.run_once(at(9, 0)).await;
    assert_eq!(report.attempted, 0);

    // 09:30: connectivity back. One stored event, stamped 08:55.
    store.set_offline(false);
    let report = coordinator.run_once(at(9, 30)).await;
    assert_eq!(report.synced, 1);
    assert_eq!(store.document_count(), 1);
    let doc = store.document(&event_id).unwrap();
    assert_eq!(doc["timestamp"], serde_json::json!(at(8, 55)));
    assert_eq!(doc["kind"], serde_json::json!("clock_in"));
    assert!(doc.get("sync_status").is_none());

    // Synced events leave the queue and are never resent.
    assert!(queue.lock().await.is_empty());
    let calls_before = store.calls_for(&event_id);
    coordinator.run_once(at(10, 0)).await;
    assert_eq!(store.calls_for(&event_id), calls_before);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("queue.json");

    let event = TimeEvent {
        event_id: "ev-1".to_string(),
        employee_id: "emp-1".to_string(),
        job_site_id: "site-1".to_string(),
        session_id: "sess-1".to_string(),
        sequence_number: 1,
        kind: TimeEventKind::ClockIn,
        timestamp: at(8, 55),
        method: RecordingMethod::Geofence,
        sync_status: SyncState::Pending,
    };

    {
        let mut queue = OfflineEventQueue::new_with_path(path.clone());
        queue.enqueue(event);
        queue.persist().unwrap();
    }

    // App restart: a fresh queue instance reloads the pending event and
    // the coordinator drains it.
    let mut queue = OfflineEventQueue::new_with_path(path);
    queue.load().unwrap();
    assert_eq!(queue.pending_count(), 1);

    let store = Arc::new(MemoryStore::default());
    let coordinator = SyncCoordinator::new(
        store.clone(),
        Arc::new(tokio::sync::Mutex::new(queue)),
    );
    let report = coordinator.run_once(at(9, 30)).await;
    assert_eq!(report.synced, 1);
    assert!(store.document("ev-1").is_some());
}

fn full_day_events() -> Vec<TimeEvent> {
    let mk = |seq: u64, kind: TimeEventKind, h: u32, m: u32| TimeEvent {
        event_id: format!("ev-{seq}"),
        employee_id: "emp-1".to_string(),
        job_site_id: "site-1".to_string(),
        session_id: "sess-1".to_string(),
        sequence_number: seq,
        kind,
        timestamp: at(h, m),
        method: RecordingMethod::Geofence,
        sync_status: SyncState::Synced,
    };
    vec![
        mk(1, TimeEventKind::ClockIn, 8, 55),
        mk(2, TimeEventKind::BreakStart, 12, 0),
        mk(3, TimeEventKind::BreakEnd, 12, 30),
        mk(4, TimeEventKind::ClockOut, 17, 5),
    ]
}

proptest! {
    /// The remote consumer applies events by sequence number, so any
    /// arrival permutation (sync batches land out of order) rebuilds the
    /// identical session.
    #[test]
    fn replay_is_permutation_invariant(order in Just((0..4usize).collect::<Vec<_>>()).prop_shuffle()) {
        let events = full_day_events();
        let shuffled: Vec<TimeEvent> = order.iter().map(|&i| events[i].clone()).collect();

        let canonical = replay_session(&schedule(), "sess-1", &events);
        let rebuilt = replay_session(&schedule(), "sess-1", &shuffled);
        prop_assert_eq!(&rebuilt, &canonical);
        prop_assert_eq!(rebuilt.status, SessionStatus::Completed);
        prop_assert_eq!(rebuilt.break_duration_secs, 30 * 60);
    }

    /// Duplicated deliveries (at-least-once transport) fold to the same
    /// session as a single delivery.
    #[test]
    fn replay_absorbs_duplicate_deliveries(dup_index in 0..4usize) {
        let mut events = full_day_events();
        events.push(events[dup_index].clone());

        let canonical = replay_session(&schedule(), "sess-1", &full_day_events());
        let rebuilt = replay_session(&schedule(), "sess-1", &events);
        prop_assert_eq!(rebuilt, canonical);
    }
}
