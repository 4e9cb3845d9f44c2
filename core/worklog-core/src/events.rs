//! Lifecycle and sync notifications fanned out to in-process listeners.
//!
//! Emitters must not hold their internal locks while calling
//! [`EventHub::emit`], so a listener is always free to call back into the
//! manager or the engine.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

use crate::session::Session;

/// Notifications produced by the lifecycle manager and the sync engine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session transitioned from nothing to open.
    Started { session: Session },
    /// An open session was closed, explicitly or by the inactivity watchdog.
    Ended { session: Session },
    /// A full sync run finished, skipped runs excluded.
    SyncCompleted {
        synced: usize,
        failed: usize,
        duration: Duration,
    },
    /// A session could not be delivered because the transport failed.
    /// Remote rejections do not produce this event; they only update the
    /// session's sync fields.
    SyncFailed { session: Session, error: String },
}

/// Fan-out point for [`SessionEvent`]s.
///
/// Each subscriber gets its own unbounded channel; a subscriber that has been
/// dropped is pruned on the next emit.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn emit(&self, event: &SessionEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}
