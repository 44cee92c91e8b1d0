//! Sync coordinator draining the offline queue to the remote store.
//!
//! Delivery is ordered (original insertion order), batched, and idempotent
//! (remote upserts by `event_id`). On partial batch failure only the
//! failed subset is retried, with exponential backoff and a bounded
//! attempt count; after that events are left queued, never dropped. The
//! remote consumer applies events by `sequence_number`, so out-of-order
//! batch delivery cannot corrupt session reconstruction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::error::SyncError;
use crate::sync::SharedQueue;

/// Collection name for time events on the remote side.
const TIME_EVENTS: &str = "time_events";

/// Remote document store, injected at construction.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Idempotent by `id`: same id means same record, safe to resend.
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<(), SyncError>;

    /// Fetch documents matching a field filter.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<serde_json::Value>, SyncError>;
}

/// Retry schedule: `base * 2^attempts`, capped, bounded attempt count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_secs: i64,
    pub cap_secs: i64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 30,
            cap_secs: 3600,
            max_attempts: 8,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt, given attempts already made.
    pub fn delay(&self, attempts: u32) -> Duration {
        let exp = attempts.min(20);
        let secs = self
            .base_secs
            .saturating_mul(1i64 << exp)
            .min(self.cap_secs);
        Duration::seconds(secs)
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Current sync status for the "pending sync" indicator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub pending_count: usize,
    pub exhausted_count: usize,
}

/// Drains the offline queue to the remote store.
pub struct SyncCoordinator<S: RemoteStore> {
    store: Arc<S>,
    queue: SharedQueue,
    backoff: BackoffPolicy,
    batch_size: usize,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
}

impl<S: RemoteStore> SyncCoordinator<S> {
    pub fn new(store: Arc<S>, queue: SharedQueue) -> Self {
        Self {
            store,
            queue,
            backoff: BackoffPolicy::default(),
            batch_size: 25,
            last_sync_at: Mutex::new(None),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// One drain pass: send everything due at `now`, in original order.
    /// Call on connectivity-regained; the periodic loop calls it too.
    pub async fn run_once(&self, now: DateTime<Utc>) -> SyncReport {
        let due = {
            let queue = self.queue.lock().await;
            queue.ready(now)
        };
        let mut report = SyncReport::default();

        for batch in due.chunks(self.batch_size) {
            for event in batch {
                report.attempted += 1;
                let result = self
                    .store
                    .upsert(TIME_EVENTS, &event.event_id, event.to_payload())
                    .await;

                let mut queue = self.queue.lock().await;
                match result {
                    Ok(()) => {
                        queue.mark_synced(&event.event_id);
                        report.synced += 1;
                    }
                    Err(err) => {
                        let attempts = queue.attempts(&event.event_id);
                        let retry_at = if err.is_retryable()
                            && attempts + 1 < self.backoff.max_attempts
                        {
                            Some(now + self.backoff.delay(attempts))
                        } else {
                            None
                        };
                        tracing::warn!(
                            event_id = %event.event_id,
                            attempts = attempts + 1,
                            retry = retry_at.is_some(),
                            error = %err,
                            "event upsert failed"
                        );
                        queue.mark_failed(&event.event_id, &err.to_string(), retry_at);
                        report.failed += 1;
                    }
                }
            }
        }

        {
            let queue = self.queue.lock().await;
            if let Err(err) = queue.persist() {
                tracing::warn!(error = %err, "failed to persist event queue");
            }
        }
        if let Ok(mut guard) = self.last_sync_at.lock() {
            *guard = Some(now);
        }
        if report.synced > 0 {
            tracing::info!(synced = report.synced, failed = report.failed, "sync pass done");
        }
        report
    }

    /// Periodic drain loop. Ends when `shutdown` flips to true.
    pub async fn run(
        &self,
        interval: std::time::Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(Utc::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub async fn status(&self) -> SyncStatus {
        let queue = self.queue.lock().await;
        let last_sync_at = self.last_sync_at.lock().ok().and_then(|g| *g);
        SyncStatus {
            last_sync_at,
            pending_count: queue.pending_count(),
            exhausted_count: queue.exhausted_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordingMethod, SyncState, TimeEvent, TimeEventKind};
    use crate::sync::OfflineEventQueue;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// In-memory remote store that can fail specific ids a set number
    /// of times, counting upserts per id.
    struct FakeStore {
        records: tokio::sync::Mutex<HashMap<String, serde_json::Value>>,
        upsert_counts: tokio::sync::Mutex<HashMap<String, usize>>,
        fail_remaining: tokio::sync::Mutex<HashMap<String, (usize, bool)>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                records: tokio::sync::Mutex::new(HashMap::new()),
                upsert_counts: tokio::sync::Mutex::new(HashMap::new()),
                fail_remaining: tokio::sync::Mutex::new(HashMap::new()),
            }
        }

        /// Fail the next `times` upserts of `id`; `retryable` picks the
        /// error kind.
        async fn fail_next(&self, id: &str, times: usize, retryable: bool) {
            self.fail_remaining
                .lock()
                .await
                .insert(id.to_string(), (times, retryable));
        }

        async fn stored(&self, id: &str) -> Option<serde_json::Value> {
            self.records.lock().await.get(id).cloned()
        }

        async fn upserts(&self, id: &str) -> usize {
            self.upsert_counts.lock().await.get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait::async_trait]
    impl RemoteStore for FakeStore {
        async fn upsert(
            &self,
            _collection: &str,
            id: &str,
            payload: serde_json::Value,
        ) -> Result<(), SyncError> {
            *self
                .upsert_counts
                .lock()
                .await
                .entry(id.to_string())
                .or_insert(0) += 1;
            let mut failures = self.fail_remaining.lock().await;
            if let Some((remaining, retryable)) = failures.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return if *retryable {
                        Err(SyncError::Timeout { elapsed_secs: 30 })
                    } else {
                        Err(SyncError::Rejected {
                            event_id: id.to_string(),
                            reason: "validation".to_string(),
                        })
                    };
                }
            }
            drop(failures);
            self.records.lock().await.insert(id.to_string(), payload);
            Ok(())
        }

        async fn query(
            &self,
            _collection: &str,
            field: &str,
            value: &str,
        ) -> Result<Vec<serde_json::Value>, SyncError> {
            Ok(self
                .records
                .lock()
                .await
                .values()
                .filter(|v| v.get(field).and_then(|f| f.as_str()) == Some(value))
                .cloned()
                .collect())
        }
    }

    fn event(id: &str, seq: u64) -> TimeEvent {
        TimeEvent {
            event_id: id.to_string(),
            employee_id: "e1".to_string(),
            job_site_id: "site1".to_string(),
            session_id: "sess1".to_string(),
            sequence_number: seq,
            kind: TimeEventKind::ClockIn,
            timestamp: Utc::now(),
            method: RecordingMethod::Geofence,
            sync_status: SyncState::Pending,
        }
    }

    fn shared_queue(events: &[TimeEvent]) -> SharedQueue {
        let mut q = OfflineEventQueue::new_with_path(PathBuf::from("/nonexistent/unused.json"));
        for ev in events {
            q.enqueue(ev.clone());
        }
        Arc::new(tokio::sync::Mutex::new(q))
    }

    #[tokio::test]
    async fn drains_queue_in_order() {
        let store = Arc::new(FakeStore::new());
        let queue = shared_queue(&[event("a", 1), event("b", 2), event("c", 3)]);
        let coordinator = SyncCoordinator::new(store.clone(), queue.clone());

        let report = coordinator.run_once(Utc::now()).await;
        assert_eq!(report, SyncReport { attempted: 3, synced: 3, failed: 0 });
        assert!(queue.lock().await.is_empty());
        assert!(store.stored("b").await.is_some());
    }

    #[tokio::test]
    async fn partial_failure_retries_only_failed_subset() {
        let store = Arc::new(FakeStore::new());
        store.fail_next("b", 1, true).await;
        let queue = shared_queue(&[event("a", 1), event("b", 2), event("c", 3)]);
        let backoff = BackoffPolicy {
            base_secs: 60,
            ..BackoffPolicy::default()
        };
        let coordinator =
            SyncCoordinator::new(store.clone(), queue.clone()).with_backoff(backoff);

        let now = Utc::now();
        let report = coordinator.run_once(now).await;
        assert_eq!(report.synced, 2);
        assert_eq!(report.failed, 1);

        // Second pass before the backoff elapses sends nothing.
        let report = coordinator.run_once(now + Duration::seconds(1)).await;
        assert_eq!(report.attempted, 0);

        // After the backoff, only "b" is resent.
        let report = coordinator.run_once(now + Duration::seconds(61)).await;
        assert_eq!(report, SyncReport { attempted: 1, synced: 1, failed: 0 });
        assert_eq!(store.upserts("a").await, 1);
        assert_eq!(store.upserts("b").await, 2);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let store = Arc::new(FakeStore::new());
        store.fail_next("a", 1, false).await;
        let queue = shared_queue(&[event("a", 1)]);
        let coordinator = SyncCoordinator::new(store.clone(), queue.clone());

        let now = Utc::now();
        coordinator.run_once(now).await;
        let status = coordinator.status().await;
        assert_eq!(status.exhausted_count, 1);
        assert_eq!(status.pending_count, 1); // still queued, never dropped

        // No amount of waiting reschedules it.
        let report = coordinator.run_once(now + Duration::days(1)).await;
        assert_eq!(report.attempted, 0);
        assert_eq!(store.upserts("a").await, 1);
    }

    #[tokio::test]
    async fn retries_stop_after_max_attempts() {
        let store = Arc::new(FakeStore::new());
        store.fail_next("a", 100, true).await;
        let queue = shared_queue(&[event("a", 1)]);
        let backoff = BackoffPolicy {
            base_secs: 0,
            cap_secs: 0,
            max_attempts: 3,
        };
        let coordinator =
            SyncCoordinator::new(store.clone(), queue.clone()).with_backoff(backoff);

        let mut now = Utc::now();
        for _ in 0..5 {
            coordinator.run_once(now).await;
            now += Duration::seconds(1);
        }
        // 3 attempts max, then left queued.
        assert_eq!(store.upserts("a").await, 3);
        assert_eq!(coordinator.status().await.exhausted_count, 1);
    }

    #[tokio::test]
    async fn synced_events_are_never_resent() {
        let store = Arc::new(FakeStore::new());
        let queue = shared_queue(&[event("a", 1)]);
        let coordinator = SyncCoordinator::new(store.clone(), queue.clone());

        coordinator.run_once(Utc::now()).await;
        coordinator.run_once(Utc::now()).await;
        assert_eq!(store.upserts("a").await, 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            base_secs: 30,
            cap_secs: 300,
            max_attempts: 8,
        };
        assert_eq!(policy.delay(0), Duration::seconds(30));
        assert_eq!(policy.delay(1), Duration::seconds(60));
        assert_eq!(policy.delay(2), Duration::seconds(120));
        assert_eq!(policy.delay(10), Duration::seconds(300));
    }
}
