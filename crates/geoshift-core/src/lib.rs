//! # Geoshift Core Library
//!
//! This library provides the core business logic for Geoshift, a
//! schedule-aware automatic time-tracking engine. It is CLI-first: all
//! operations are available through a standalone CLI binary, with any
//! GUI or mobile shell being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Session Engine**: a wall-clock-driven state machine that turns
//!   geofence enter/exit events and timer expiries into clock-in/out
//!   records; the caller (or the session worker) periodically invokes
//!   `tick()` with the current time
//! - **Sync**: a JSON-file-backed offline event queue drained by an
//!   idempotent coordinator with bounded exponential backoff
//! - **Validator**: pure schedule-conflict detection against labor
//!   policy (overlaps, rest periods, daily/weekly hours, site capacity)
//! - **Planner**: batch schedule operations (move/copy/reassign/update/
//!   delete/swap) previewed through the validator before commit
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: per-schedule clock-in/out state machine
//! - [`SessionWorker`]: serialized async driver for one session
//! - [`SyncCoordinator`]: queue drain loop against a [`RemoteStore`]
//! - [`Config`]: TOML-backed tracking and labor-policy configuration

pub mod config;
pub mod error;
pub mod events;
pub mod geofence;
pub mod model;
pub mod planner;
pub mod session;
pub mod sync;
pub mod validator;

pub use config::{Config, ConfirmationExpiry, LaborPolicy, TrackingConfig};
pub use error::{ConfigError, CoreError, LocationError, SyncError};
pub use events::SessionEvent;
pub use geofence::{
    GeofenceRegion, LocationMonitor, RegionEvent, RegionSubscription, RegionTransition,
};
pub use model::{
    ConflictKind, ConflictSeverity, JobSite, RecordingMethod, Schedule, ScheduleConflict,
    ScheduleSession, ScheduleStatus, SessionStatus, ShiftType, SyncState, TimeEvent,
    TimeEventKind,
};
pub use planner::{
    BatchOperation, BatchPreview, ExecutionPolicy, ItemAction, ItemResult, PlannedItem,
    SchedulePatch, ScheduleWriter,
};
pub use session::{
    replay_session, EngineOutput, SessionCommand, SessionEngine, SessionRegistry, SessionWorker,
    SessionWorkerHandle,
};
pub use sync::{
    BackoffPolicy, OfflineEventQueue, QueuedEvent, RemoteStore, SharedQueue, SyncCoordinator,
    SyncReport, SyncStatus,
};
