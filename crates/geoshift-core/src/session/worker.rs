//! Serialized per-session worker.
//!
//! One tokio task owns one [`SessionEngine`]: geofence callbacks, manual
//! commands, and timer ticks all funnel through a single select loop, so
//! event processing for a session is serialized no matter which OS thread
//! the platform callback arrived on. Subscribers get every state change
//! on a broadcast channel.
//!
//! Shutdown discipline: when the session reaches a terminal state (or is
//! cancelled) the worker deregisters its geofence region before exiting.
//! Cancellation never touches events already handed to the queue.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::{CoreError, LocationError};
use crate::events::SessionEvent;
use crate::geofence::{LocationMonitor, RegionEvent, RegionSubscription};
use crate::session::{EngineOutput, SessionEngine};
use crate::sync::SharedQueue;

/// Manual actions accepted by a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    StartBreak,
    EndBreak,
    ClockOut,
    ManualClockIn,
    ConfirmClockIn,
    Cancel,
}

/// Handle to a spawned session worker.
#[derive(Debug)]
pub struct SessionWorkerHandle {
    session_id: String,
    commands: mpsc::Sender<SessionCommand>,
    updates: broadcast::Sender<SessionEvent>,
    join: JoinHandle<()>,
}

impl SessionWorkerHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Subscribe to session state changes. Late subscribers only see
    /// changes from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.updates.subscribe()
    }

    /// Send a manual command. Fails once the session has terminated.
    pub async fn send(&self, command: SessionCommand) -> Result<(), CoreError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoreError::SessionUnavailable {
                session_id: self.session_id.clone(),
                reason: "worker stopped".to_string(),
            })
    }

    /// Cancel the session and wait for the worker to clean up.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Cancel).await;
        let _ = self.join.await;
    }

    /// Wait for the worker to finish on its own (terminal session).
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Spawns serialized workers around session engines.
pub struct SessionWorker;

impl SessionWorker {
    /// Spawn the worker task. `tick_interval` drives no-show, grace, and
    /// confirmation deadlines; production uses seconds, tests milliseconds.
    pub fn spawn(
        engine: SessionEngine,
        monitor: Arc<dyn LocationMonitor>,
        queue: SharedQueue,
        tick_interval: std::time::Duration,
    ) -> SessionWorkerHandle {
        Self::spawn_inner(engine, monitor, queue, tick_interval, None)
    }

    fn spawn_inner(
        mut engine: SessionEngine,
        monitor: Arc<dyn LocationMonitor>,
        queue: SharedQueue,
        tick_interval: std::time::Duration,
        release: Option<Box<dyn FnOnce() + Send>>,
    ) -> SessionWorkerHandle {
        let session_id = engine.session_id().to_string();
        let (commands, mut command_rx) = mpsc::channel::<SessionCommand>(32);
        let (updates, _) = broadcast::channel::<SessionEvent>(64);
        let update_tx = updates.clone();

        let join = tokio::spawn(async move {
            let mut subscription: Option<RegionSubscription> = None;
            let mut registered = false;
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        if engine.due_to_arm(now) {
                            if !engine.is_manual_only() && subscription.is_none() {
                                match monitor.register(engine.region()).await {
                                    Ok(sub) => {
                                        subscription = Some(sub);
                                        registered = true;
                                        tracing::info!(
                                            session_id = %engine.session_id(),
                                            region_id = %engine.region().region_id,
                                            "geofence registered"
                                        );
                                    }
                                    Err(err) => {
                                        tracing::warn!(
                                            session_id = %engine.session_id(),
                                            error = %err,
                                            "geofence registration failed, degrading to manual"
                                        );
                                        let out = engine.degrade_to_manual(&err, now);
                                        publish(&update_tx, &queue, &engine, out).await;
                                    }
                                }
                            }
                            let out = engine.arm(now);
                            publish(&update_tx, &queue, &engine, out).await;
                        }
                        let out = engine.tick(now);
                        publish(&update_tx, &queue, &engine, out).await;
                    }
                    command = command_rx.recv() => {
                        let now = Utc::now();
                        let out = match command {
                            Some(SessionCommand::StartBreak) => engine.start_break(now),
                            Some(SessionCommand::EndBreak) => engine.end_break(now),
                            Some(SessionCommand::ClockOut) => engine.request_clock_out(now),
                            Some(SessionCommand::ManualClockIn) => engine.manual_clock_in(now),
                            Some(SessionCommand::ConfirmClockIn) => engine.confirm_clock_in(now),
                            Some(SessionCommand::Cancel) => engine.cancel(now),
                            None => engine.cancel(now), // All handles dropped.
                        };
                        publish(&update_tx, &queue, &engine, out).await;
                    }
                    region_event = recv_region(&mut subscription), if subscription.is_some() => {
                        match region_event {
                            Some(ev) => {
                                let out = engine.handle_region(&ev);
                                publish(&update_tx, &queue, &engine, out).await;
                            }
                            None => {
                                // Monitor dropped our stream mid-session.
                                subscription = None;
                                let err = LocationError::SubscriptionClosed {
                                    region_id: engine.region().region_id,
                                };
                                let out = engine.degrade_to_manual(&err, Utc::now());
                                publish(&update_tx, &queue, &engine, out).await;
                            }
                        }
                    }
                }

                if engine.status().is_terminal() {
                    break;
                }
            }

            if registered {
                let region_id = engine.region().region_id;
                if let Err(err) = monitor.deregister(&region_id).await {
                    tracing::warn!(region_id = %region_id, error = %err, "deregister failed");
                } else {
                    tracing::info!(region_id = %region_id, "geofence deregistered");
                }
            }
            tracing::info!(
                session_id = %engine.session_id(),
                status = ?engine.status(),
                "session worker finished"
            );
            if let Some(release) = release {
                release();
            }
        });

        SessionWorkerHandle {
            session_id,
            commands,
            updates,
            join,
        }
    }
}

/// Spawn gate enforcing one non-terminal session per employee.
///
/// The slot is held from spawn until the worker task finishes (terminal
/// status or cancellation), so a second overlapping schedule for the
/// same employee is refused instead of double-tracking them.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    /// employee_id -> live session_id.
    live: Arc<Mutex<HashMap<String, String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a worker, refusing when the employee already has a live
    /// session.
    pub fn spawn(
        &self,
        engine: SessionEngine,
        monitor: Arc<dyn LocationMonitor>,
        queue: SharedQueue,
        tick_interval: std::time::Duration,
    ) -> Result<SessionWorkerHandle, CoreError> {
        let employee_id = engine.schedule().employee_id.clone();
        let session_id = engine.session_id().to_string();
        {
            let mut live = self
                .live
                .lock()
                .map_err(|_| CoreError::Custom("session registry poisoned".to_string()))?;
            if let Some(existing) = live.get(&employee_id) {
                return Err(CoreError::SessionActive {
                    employee_id,
                    session_id: existing.clone(),
                });
            }
            live.insert(employee_id.clone(), session_id);
        }

        let live = Arc::clone(&self.live);
        let release = Box::new(move || {
            if let Ok(mut map) = live.lock() {
                map.remove(&employee_id);
            }
        });
        Ok(SessionWorker::spawn_inner(
            engine,
            monitor,
            queue,
            tick_interval,
            Some(release),
        ))
    }

    /// Whether the employee currently holds a live session slot.
    pub fn is_live(&self, employee_id: &str) -> bool {
        self.live
            .lock()
            .map(|map| map.contains_key(employee_id))
            .unwrap_or(false)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().map(|map| map.len()).unwrap_or(0)
    }
}

async fn recv_region(subscription: &mut Option<RegionSubscription>) -> Option<RegionEvent> {
    match subscription.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Queue emitted facts, then broadcast notices plus a fresh snapshot.
async fn publish(
    updates: &broadcast::Sender<SessionEvent>,
    queue: &SharedQueue,
    engine: &SessionEngine,
    out: EngineOutput,
) {
    if out.is_empty() {
        return;
    }
    if !out.emitted.is_empty() {
        let mut queue = queue.lock().await;
        for event in out.emitted {
            queue.enqueue(event);
        }
        if let Err(err) = queue.persist() {
            tracing::warn!(error = %err, "failed to persist event queue");
        }
    }
    for notice in out.notices {
        let _ = updates.send(notice);
    }
    let now = Utc::now();
    let _ = updates.send(SessionEvent::Snapshot {
        session: engine.snapshot(now),
        at: now,
    });
}
