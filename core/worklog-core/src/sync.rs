//! Synchronization engine: drains completed, unsynced sessions to the remote.
//!
//! # Single-Flight
//!
//! At most one sync run executes at a time. A second [`SyncEngine::sync_all`]
//! arriving while one is in flight returns immediately without touching the
//! network or any session; this is part of the engine's contract, not an
//! optimization, because the remote may not be idempotent on duplicate
//! submissions and overlapping runs would double-count in their reports.
//!
//! # Failure Bookkeeping
//!
//! Failures never propagate to the caller; they land on the session record
//! (`sync_error`, `sync_attempts`, `last_sync_attempt`) where the next run
//! picks the session up again. The engine schedules nothing itself; retry
//! cadence belongs to whoever calls `sync_all`.
//!
//! Transport failures additionally emit [`SessionEvent::SyncFailed`]. Remote
//! rejections do not: the remote received the session and answered, so there
//! is nothing transport-shaped to surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::events::{EventHub, SessionEvent};
use crate::manager::SessionManager;
use crate::session::Session;
use crate::submit::{RemoteSubmitter, SubmitRequest};

/// Outcome of one sync run. Skipped runs produce no report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Aggregate view over the whole session log, recomputed on demand and never
/// persisted. `failed_sessions` counts sessions carrying a `sync_error` that
/// have not since been delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatistics {
    pub total_sessions: usize,
    pub synced_sessions: usize,
    pub unsynced_sessions: usize,
    pub failed_sessions: usize,
    pub last_successful_sync: Option<DateTime<Utc>>,
}

/// Releases the single-flight flag when dropped, so the flag cannot stay
/// stuck even if a submitter panics mid-run.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine {
    manager: Arc<SessionManager>,
    submitter: Arc<dyn RemoteSubmitter>,
    events: Arc<EventHub>,
    in_flight: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        manager: Arc<SessionManager>,
        submitter: Arc<dyn RemoteSubmitter>,
        events: Arc<EventHub>,
    ) -> Self {
        SyncEngine {
            manager,
            submitter,
            events,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Delivers one session. Returns true on success, including the
    /// already-synced case, which succeeds without a network call.
    pub fn sync_one(&self, session: &Session) -> bool {
        if session.synced {
            return true;
        }
        // An open session has no end time and must never reach the remote.
        let request = match SubmitRequest::for_session(session, Utc::now()) {
            Some(request) => request,
            None => {
                debug!(session_id = %session.id, "Refusing to sync an open session");
                return false;
            }
        };

        match self.submitter.submit(&request) {
            Ok(response) if response.success => {
                self.manager.mark_synced(&session.id);
                debug!(session_id = %session.id, "Session synced");
                true
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| "remote rejected the session".to_string());
                warn!(session_id = %session.id, message = %message, "Remote rejected session");
                self.manager.record_sync_failure(&session.id, &message);
                false
            }
            Err(err) => {
                let message = err.to_string();
                warn!(session_id = %session.id, error = %message, "Session sync failed");
                let updated = self.manager.record_sync_failure(&session.id, &message);
                self.events.emit(&SessionEvent::SyncFailed {
                    session: updated.unwrap_or_else(|| session.clone()),
                    error: message,
                });
                false
            }
        }
    }

    /// Runs one full sync pass over the eligible sessions, sequentially and
    /// in insertion order. Returns None when another run is already in
    /// flight; that call performs no network calls and mutates nothing.
    ///
    /// Sessions that become eligible after the snapshot is taken wait for
    /// the next run.
    pub fn sync_all(&self) -> Option<SyncReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Sync already in flight, skipping");
            return None;
        }
        let guard = FlightGuard(&self.in_flight);

        let started = Instant::now();
        let pending = self.manager.unsynced_sessions();
        if !pending.is_empty() {
            info!(pending = pending.len(), "Sync run started");
        }

        let mut synced = 0usize;
        let mut failed = 0usize;
        for session in &pending {
            if self.sync_one(session) {
                synced += 1;
            } else {
                failed += 1;
            }
        }

        let duration = started.elapsed();
        let report = SyncReport {
            synced,
            failed,
            duration_ms: duration.as_millis() as u64,
        };
        info!(
            synced = report.synced,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Sync run finished"
        );

        // Release before notifying so a listener may start the next run.
        drop(guard);
        self.events.emit(&SessionEvent::SyncCompleted {
            synced,
            failed,
            duration,
        });
        Some(report)
    }

    /// Recomputes aggregate statistics from the current session log.
    pub fn statistics(&self) -> SyncStatistics {
        let sessions = self.manager.all_sessions();
        SyncStatistics {
            total_sessions: sessions.len(),
            synced_sessions: sessions.iter().filter(|s| s.synced).count(),
            unsynced_sessions: sessions.iter().filter(|s| s.needs_sync()).count(),
            failed_sessions: sessions
                .iter()
                .filter(|s| s.sync_error.is_some() && !s.synced)
                .count(),
            last_successful_sync: sessions
                .iter()
                .filter(|s| s.synced)
                .filter_map(|s| s.last_sync_attempt)
                .max(),
        }
    }
}
