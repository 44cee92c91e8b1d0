//! Durable offline queue of not-yet-confirmed work events.
//!
//! Events persist in insertion order and survive process restarts.
//! Enqueue is idempotent by `event_id`; a synced event leaves the queue
//! and can never be resent or mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::data_dir;
use crate::model::{SyncState, TimeEvent};

/// Queue handle shared between session workers and the sync coordinator.
pub type SharedQueue = Arc<Mutex<OfflineEventQueue>>;

/// One queued event plus its delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub event: TimeEvent,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// When the next retry is due. `None` on a failed event means retries
    /// are exhausted; it stays queued until something external changes.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Ordered, persistent buffer of pending `TimeEvent`s.
pub struct OfflineEventQueue {
    entries: Vec<QueuedEvent>,
    queue_file: PathBuf,
    /// Events confirmed by the remote since this queue was loaded.
    synced_count: usize,
}

impl OfflineEventQueue {
    /// Create a queue persisting to the default data directory.
    pub fn new() -> Self {
        let dir = data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new_with_path(dir.join("event_queue.json"))
    }

    /// Create a queue with a specific backing file (for testing).
    pub fn new_with_path(path: PathBuf) -> Self {
        Self {
            entries: Vec::new(),
            queue_file: path,
            synced_count: 0,
        }
    }

    /// Append an event. Idempotent: a second enqueue of the same
    /// `event_id` is a no-op and returns false.
    pub fn enqueue(&mut self, event: TimeEvent) -> bool {
        if self
            .entries
            .iter()
            .any(|e| e.event.event_id == event.event_id)
        {
            return false;
        }
        self.entries.push(QueuedEvent {
            event,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
        });
        true
    }

    /// Events due for delivery at `now`, in original insertion order.
    /// Fresh events are always due; failed events wait out their backoff;
    /// exhausted events are excluded.
    pub fn ready(&self, now: DateTime<Utc>) -> Vec<TimeEvent> {
        self.entries
            .iter()
            .filter(|e| match e.event.sync_status {
                SyncState::Pending => true,
                SyncState::Failed => e.next_attempt_at.is_some_and(|t| t <= now),
                SyncState::Synced => false,
            })
            .map(|e| e.event.clone())
            .collect()
    }

    /// Remote confirmed the event; it leaves the queue for good.
    pub fn mark_synced(&mut self, event_id: &str) {
        let before = self.entries.len();
        self.entries.retain(|e| e.event.event_id != event_id);
        if self.entries.len() < before {
            self.synced_count += 1;
        }
    }

    /// Record a delivery failure. `retry_at = None` stops automatic
    /// retries but keeps the event queued -- never silently dropped.
    pub fn mark_failed(&mut self, event_id: &str, error: &str, retry_at: Option<DateTime<Utc>>) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.event.event_id == event_id)
        {
            entry.attempts += 1;
            entry.event.sync_status = SyncState::Failed;
            entry.next_attempt_at = retry_at;
            entry.last_error = Some(error.to_string());
        }
    }

    /// Attempts recorded for an event still in the queue.
    pub fn attempts(&self, event_id: &str) -> u32 {
        self.entries
            .iter()
            .find(|e| e.event.event_id == event_id)
            .map(|e| e.attempts)
            .unwrap_or(0)
    }

    /// Everything still awaiting confirmation ("pending sync" indicator).
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Events whose retries ran out.
    pub fn exhausted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.event.sync_status == SyncState::Failed && e.next_attempt_at.is_none())
            .count()
    }

    /// Events confirmed since load.
    pub fn synced_count(&self) -> usize {
        self.synced_count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all queued entries, oldest first.
    pub fn entries(&self) -> &[QueuedEvent] {
        &self.entries
    }

    /// Persist queue to disk.
    pub fn persist(&self) -> Result<(), std::io::Error> {
        let data = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.queue_file, data)?;
        Ok(())
    }

    /// Load queue from disk. Missing file is an empty queue.
    pub fn load(&mut self) -> Result<(), std::io::Error> {
        if !self.queue_file.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.queue_file)?;
        self.entries = serde_json::from_str(&content)?;
        Ok(())
    }
}

impl Default for OfflineEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordingMethod, TimeEventKind};
    use chrono::Duration;

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

    fn queue() -> OfflineEventQueue {
        OfflineEventQueue::new_with_path(PathBuf::from("/nonexistent/unused.json"))
    }

    #[test]
    fn enqueue_preserves_insertion_order() {
        let mut q = queue();
        for i in 0..5 {
            q.enqueue(event(&format!("ev-{i}"), i));
        }
        let ready = q.ready(Utc::now());
        let ids: Vec<_> = ready.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["ev-0", "ev-1", "ev-2", "ev-3", "ev-4"]);
    }

    #[test]
    fn enqueue_is_idempotent_by_id() {
        let mut q = queue();
        assert!(q.enqueue(event("ev-1", 1)));
        assert!(!q.enqueue(event("ev-1", 1)));
        assert_eq!(q.pending_count(), 1);
    }

    #[test]
    fn synced_events_leave_and_never_return() {
        let mut q = queue();
        q.enqueue(event("ev-1", 1));
        q.mark_synced("ev-1");
        assert!(q.is_empty());
        assert_eq!(q.synced_count(), 1);
        assert!(q.ready(Utc::now()).is_empty());
    }

    #[test]
    fn failed_events_wait_out_backoff() {
        let now = Utc::now();
        let mut q = queue();
        q.enqueue(event("ev-1", 1));
        q.mark_failed("ev-1", "timeout", Some(now + Duration::seconds(60)));

        assert!(q.ready(now).is_empty());
        assert_eq!(q.ready(now + Duration::seconds(61)).len(), 1);
        assert_eq!(q.attempts("ev-1"), 1);
    }

    #[test]
    fn exhausted_events_stay_queued_but_not_ready() {
        let mut q = queue();
        q.enqueue(event("ev-1", 1));
        q.mark_failed("ev-1", "rejected", None);

        assert!(q.ready(Utc::now() + Duration::days(365)).is_empty());
        assert_eq!(q.pending_count(), 1);
        assert_eq!(q.exhausted_count(), 1);
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("queue.json");

        let mut q = OfflineEventQueue::new_with_path(path.clone());
        q.enqueue(event("ev-1", 1));
        q.enqueue(event("ev-2", 2));
        q.mark_failed("ev-2", "timeout", Some(Utc::now()));
        q.persist().unwrap();

        let mut q2 = OfflineEventQueue::new_with_path(path);
        q2.load().unwrap();
        assert_eq!(q2.pending_count(), 2);
        assert_eq!(q2.attempts("ev-2"), 1);
        let ids: Vec<_> = q2
            .entries()
            .iter()
            .map(|e| e.event.event_id.clone())
            .collect();
        assert_eq!(ids, vec!["ev-1", "ev-2"]);
    }

    #[test]
    fn load_without_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut q = OfflineEventQueue::new_with_path(dir.path().join("missing.json"));
        q.load().unwrap();
        assert!(q.is_empty());
    }
}
