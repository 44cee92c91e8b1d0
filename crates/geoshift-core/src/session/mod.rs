//! Per-employee work-session tracking.
//!
//! [`SessionEngine`] is the synchronous state machine; [`SessionWorker`]
//! wraps one engine in a serialized tokio task wired to the geofence
//! monitor and the offline queue; [`replay_session`] is the remote-side
//! fold that rebuilds a session from its event log.

mod engine;
mod replay;
mod worker;

pub use engine::{EngineOutput, SessionEngine};
pub use replay::replay_session;
pub use worker::{SessionCommand, SessionRegistry, SessionWorker, SessionWorkerHandle};
