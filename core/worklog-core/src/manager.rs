//! Session lifecycle state machine.
//!
//! Two states: Idle (no open session) and Active (exactly one open session
//! with an inactivity deadline armed). Activity signals start a session when
//! Idle and push the deadline out when Active; an explicit end or the
//! inactivity watchdog closes the open session through the same path.
//!
//! # Concurrency
//!
//! Every "is there an open session" decision happens inside one mutex scoped
//! to this manager, including the deadline (re)arming that depends on it, so
//! a signal racing the watchdog can never double-close or start against a
//! close. The store write belongs to the transition and happens inside the
//! critical section; event emission never does — transition results are
//! captured first, the lock is released, then listeners are notified, so a
//! listener is free to call back into the manager.
//!
//! # Inactivity Watchdog
//!
//! A background thread polls the deadline a few times a second and closes the
//! open session once it passes. Closing goes through the same code path as an
//! explicit end; the watchdog holds no state of its own.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use crate::events::{EventHub, SessionEvent};
use crate::session::Session;
use crate::store::SessionStore;

/// How often the watchdog checks the inactivity deadline. Bounds how far past
/// the deadline an auto-close can land.
const WATCHDOG_POLL_INTERVAL_MS: u64 = 250;

#[derive(Default)]
struct ManagerState {
    /// The one open session, if any. External readers get snapshot copies.
    current: Option<Session>,
    /// When the open session times out. Rearmed on every activity signal.
    deadline: Option<Instant>,
    shutdown: bool,
}

/// Owns the open-session invariant and drives automatic start/stop.
pub struct SessionManager {
    store: Arc<SessionStore>,
    events: Arc<EventHub>,
    inactivity_timeout: Duration,
    state: Mutex<ManagerState>,
}

impl SessionManager {
    pub fn new(
        store: Arc<SessionStore>,
        events: Arc<EventHub>,
        inactivity_timeout: Duration,
    ) -> Self {
        SessionManager {
            store,
            events,
            inactivity_timeout,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Spawns the background thread that closes the open session once its
    /// inactivity deadline passes. Exits after [`SessionManager::shutdown`].
    pub fn spawn_inactivity_watchdog(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let manager = Arc::clone(self);
        thread::spawn(move || loop {
            thread::sleep(Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS));
            if manager.is_shut_down() {
                return;
            }
            manager.reap_inactive();
        })
    }

    /// Reports one activity signal: starts a session when Idle, otherwise
    /// pushes the inactivity deadline out. Safe to call at arbitrary
    /// frequency; a silent no-op after shutdown.
    pub fn record_activity(&self) {
        let started = match self.state.lock() {
            Ok(mut state) => {
                if state.shutdown {
                    return;
                }
                if state.current.is_some() {
                    state.deadline = Some(Instant::now() + self.inactivity_timeout);
                    None
                } else {
                    Some(self.start_locked(&mut state))
                }
            }
            Err(_) => return,
        };

        if let Some(session) = started {
            self.events.emit(&SessionEvent::Started { session });
        }
    }

    /// Starts a session explicitly. Returns the open session either way:
    /// the new one, or the already-open one when this is a no-op. None only
    /// after shutdown.
    pub fn start_session(&self) -> Option<Session> {
        let (session, started) = match self.state.lock() {
            Ok(mut state) => {
                if state.shutdown {
                    return None;
                }
                match &state.current {
                    Some(current) => (current.clone(), false),
                    None => (self.start_locked(&mut state), true),
                }
            }
            Err(_) => return None,
        };

        if started {
            self.events.emit(&SessionEvent::Started {
                session: session.clone(),
            });
        }
        Some(session)
    }

    /// Ends the open session. Returns the completed session, or None when
    /// Idle (a no-op, not an error).
    pub fn end_session(&self) -> Option<Session> {
        let ended = match self.state.lock() {
            Ok(mut state) => {
                if state.shutdown {
                    return None;
                }
                self.close_current_locked(&mut state)
            }
            Err(_) => return None,
        };

        if let Some(session) = &ended {
            self.events.emit(&SessionEvent::Ended {
                session: session.clone(),
            });
        }
        ended
    }

    /// Snapshot of the open session, or None when Idle.
    pub fn current_session(&self) -> Option<Session> {
        self.state.lock().ok().and_then(|state| state.current.clone())
    }

    /// Every recorded session, in insertion order.
    pub fn all_sessions(&self) -> Vec<Session> {
        self.store.all()
    }

    /// Sessions eligible for sync: completed and not yet delivered.
    pub fn unsynced_sessions(&self) -> Vec<Session> {
        self.store.unsynced()
    }

    /// Marks a session as delivered: sets `synced`, clears `sync_error`,
    /// stamps `last_sync_attempt`, persists. Unknown ids are a no-op.
    pub fn mark_synced(&self, id: &str) -> Option<Session> {
        self.store.modify(id, |session| {
            session.synced = true;
            session.sync_error = None;
            session.last_sync_attempt = Some(Utc::now());
        })
    }

    /// Records a failed delivery attempt: sets `sync_error`, stamps
    /// `last_sync_attempt`, increments `sync_attempts`, persists. Unknown
    /// ids are a no-op.
    pub fn record_sync_failure(&self, id: &str, message: &str) -> Option<Session> {
        self.store.modify(id, |session| {
            session.sync_error = Some(message.to_string());
            session.last_sync_attempt = Some(Utc::now());
            session.sync_attempts = session.sync_attempts.saturating_add(1);
        })
    }

    /// Disarms the inactivity timer and turns every later signal, command,
    /// and watchdog tick into a silent no-op. Does not close an open session;
    /// one left open here is discarded by the next load.
    pub fn shutdown(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.shutdown = true;
            state.deadline = None;
        }
    }

    fn is_shut_down(&self) -> bool {
        self.state.lock().map(|state| state.shutdown).unwrap_or(true)
    }

    /// Closes the open session if its deadline has passed. One watchdog tick.
    fn reap_inactive(&self) {
        let ended = match self.state.lock() {
            Ok(mut state) => {
                if state.shutdown {
                    return;
                }
                match state.deadline {
                    Some(deadline) if Instant::now() >= deadline => {
                        self.close_current_locked(&mut state)
                    }
                    _ => None,
                }
            }
            Err(_) => return,
        };

        if let Some(session) = ended {
            debug!(session_id = %session.id, "Session closed by inactivity timeout");
            self.events.emit(&SessionEvent::Ended { session });
        }
    }

    /// Creates and persists a new open session. Caller holds the state lock
    /// and emits `Started` after releasing it.
    fn start_locked(&self, state: &mut ManagerState) -> Session {
        let session = Session::open_at(Utc::now());
        debug!(session_id = %session.id, "Session started");
        self.store.append(session.clone());
        state.current = Some(session.clone());
        state.deadline = Some(Instant::now() + self.inactivity_timeout);
        session
    }

    /// The one close path, shared by explicit end and the watchdog. Caller
    /// holds the state lock and emits `Ended` after releasing it.
    fn close_current_locked(&self, state: &mut ManagerState) -> Option<Session> {
        let mut session = state.current.take()?;
        session.end_time = Some(Utc::now());
        state.deadline = None;
        debug!(
            session_id = %session.id,
            duration_secs = session.duration().num_seconds(),
            "Session ended"
        );
        self.store.update(&session);
        Some(session)
    }
}
