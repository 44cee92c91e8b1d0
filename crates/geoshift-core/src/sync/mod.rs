//! Offline-first event delivery.
//!
//! Facts flow `SessionEngine -> OfflineEventQueue -> SyncCoordinator ->
//! remote store`. The queue survives restarts; the coordinator delivers
//! in original order with idempotent upserts and bounded-backoff retries.

mod coordinator;
mod queue;

pub use coordinator::{BackoffPolicy, RemoteStore, SyncCoordinator, SyncReport, SyncStatus};
pub use queue::{OfflineEventQueue, QueuedEvent, SharedQueue};
