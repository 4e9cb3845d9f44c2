//! Session records, the unit of tracked work.
//!
//! Current on-disk format is v1 (see `store`).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A bounded span of tracked activity.
///
/// A session without an `end_time` is open; the lifecycle manager guarantees
/// at most one open session exists at a time. The sync bookkeeping fields
/// (`synced`, `last_sync_attempt`, `sync_error`, `sync_attempts`) are only
/// touched by the sync paths, never by lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub last_sync_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_error: Option<String>,
    #[serde(default)]
    pub sync_attempts: u32,
}

impl Session {
    /// Creates a fresh open session starting at `now`.
    pub fn open_at(now: DateTime<Utc>) -> Self {
        Session {
            id: ulid::Ulid::new().to_string(),
            start_time: now,
            end_time: None,
            created_at: now,
            synced: false,
            last_sync_attempt: None,
            sync_error: None,
            sync_attempts: 0,
        }
    }

    /// Elapsed time between start and end. Zero while the session is open.
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end - self.start_time,
            None => Duration::zero(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Eligible for upload: completed but not yet delivered.
    pub fn needs_sync(&self) -> bool {
        self.is_completed() && !self.synced
    }
}
