//! File-backed session log persistence.
//!
//! Owns `~/.worklog/sessions.json`, the ordered list of every session the
//! lifecycle manager has recorded. This process is the only writer.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "sessions": [ { ... Session fields ... } ]
//! }
//! ```
//!
//! # Recovery Policy
//!
//! A session with no `end_time` found at load time means the previous process
//! terminated without closing it. Such a session is dropped, not resumed; the
//! drop is logged per session. See `SessionManager` for why at most one can
//! exist.
//!
//! # Defensive Design
//!
//! Loading tolerates a missing file, an empty file, corrupt JSON, and an
//! unsupported version — all yield an empty store with a warning rather than
//! an error. Saving is best effort: an I/O failure is logged and swallowed so
//! in-memory operation continues; the next successful save catches the file
//! up.
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a crash mid-write cannot leave a torn file.
//! The in-memory lock is released before any file I/O happens.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::session::Session;

/// Schema version written to (and required from) the log file.
const LOG_VERSION: u32 = 1;

/// The on-disk JSON structure for the session log.
#[derive(Debug, Serialize, Deserialize)]
struct LogFile {
    version: u32,
    sessions: Vec<Session>,
}

/// Durable, ordered collection of [`Session`] records.
///
/// The single source of truth for the lifecycle manager and the sync engine.
/// All accessors return owned snapshots; callers never observe the collection
/// mid-mutation.
pub struct SessionStore {
    sessions: Mutex<Vec<Session>>,
    file_path: PathBuf,
}

impl SessionStore {
    /// Loads the session log from `file_path`.
    ///
    /// Never fails: unreadable or missing storage behaves as an empty store.
    /// Any session still open in the file is discarded (abandoned by a
    /// previous process that exited without closing it).
    pub fn load(file_path: &Path) -> Self {
        let sessions = read_log(file_path);
        SessionStore {
            sessions: Mutex::new(sessions),
            file_path: file_path.to_path_buf(),
        }
    }

    /// Appends a session to the log and persists.
    pub fn append(&self, session: Session) {
        let snapshot = match self.sessions.lock() {
            Ok(mut sessions) => {
                sessions.push(session);
                sessions.clone()
            }
            Err(_) => return,
        };
        self.write_log(&snapshot);
    }

    /// Replaces the stored session with the same id and persists.
    ///
    /// Returns false (and leaves the log untouched) when no session with that
    /// id exists.
    pub fn update(&self, session: &Session) -> bool {
        let snapshot = match self.sessions.lock() {
            Ok(mut sessions) => {
                match sessions.iter_mut().find(|candidate| candidate.id == session.id) {
                    Some(slot) => *slot = session.clone(),
                    None => {
                        debug!(session_id = %session.id, "Update for unknown session ignored");
                        return false;
                    }
                }
                sessions.clone()
            }
            Err(_) => return false,
        };
        self.write_log(&snapshot);
        true
    }

    /// Applies `apply` to the session with the given id, persists, and
    /// returns the updated copy. Unknown ids are a no-op returning None.
    pub fn modify(&self, id: &str, apply: impl FnOnce(&mut Session)) -> Option<Session> {
        let (updated, snapshot) = match self.sessions.lock() {
            Ok(mut sessions) => {
                let updated = match sessions.iter_mut().find(|candidate| candidate.id == id) {
                    Some(session) => {
                        apply(session);
                        session.clone()
                    }
                    None => {
                        debug!(session_id = %id, "Modify for unknown session ignored");
                        return None;
                    }
                };
                (updated, sessions.clone())
            }
            Err(_) => return None,
        };
        self.write_log(&snapshot);
        Some(updated)
    }

    /// Returns the session with the given id, if present.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.iter().find(|session| session.id == id).cloned())
    }

    /// Snapshot of every stored session, in insertion order.
    pub fn all(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .map(|sessions| sessions.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the sessions eligible for sync (completed, not synced),
    /// in insertion order.
    pub fn unsynced(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .map(|sessions| {
                sessions
                    .iter()
                    .filter(|session| session.needs_sync())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rewrites the backing file in full. Called after the session lock has
    /// been released so lock hold time excludes I/O. Failures are logged and
    /// swallowed; in-memory state stays ahead of disk until the next save.
    fn write_log(&self, sessions: &[Session]) {
        let log = LogFile {
            version: LOG_VERSION,
            sessions: sessions.to_vec(),
        };

        let content = match serde_json::to_string_pretty(&log) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "Failed to serialize session log");
                return;
            }
        };

        let parent_dir = match self.file_path.parent() {
            Some(parent) => parent,
            None => {
                warn!(path = %self.file_path.display(), "Session log path has no parent directory");
                return;
            }
        };
        if let Err(err) = fs_err::create_dir_all(parent_dir) {
            warn!(error = %err, "Failed to create session log directory");
            return;
        }

        let mut temp_file = match NamedTempFile::new_in(parent_dir) {
            Ok(file) => file,
            Err(err) => {
                warn!(error = %err, "Failed to create temp session log");
                return;
            }
        };
        if let Err(err) = temp_file
            .write_all(content.as_bytes())
            .and_then(|_| temp_file.flush())
        {
            warn!(error = %err, "Failed to write temp session log");
            return;
        }
        if let Err(err) = temp_file.persist(&self.file_path) {
            warn!(error = %err.error, path = %self.file_path.display(), "Failed to commit session log");
        }
    }
}

fn read_log(file_path: &Path) -> Vec<Session> {
    if !file_path.exists() {
        return Vec::new();
    }

    let content = match fs_err::read_to_string(file_path) {
        Ok(content) => content,
        Err(err) => {
            warn!(error = %err, "Failed to read session log; starting empty");
            return Vec::new();
        }
    };

    if content.trim().is_empty() {
        return Vec::new();
    }

    let log = match serde_json::from_str::<LogFile>(&content) {
        Ok(log) if log.version == LOG_VERSION => log,
        Ok(log) => {
            warn!(
                version = log.version,
                expected = LOG_VERSION,
                "Unsupported session log version; starting empty"
            );
            return Vec::new();
        }
        Err(err) => {
            warn!(error = %err, "Failed to parse session log; starting empty");
            return Vec::new();
        }
    };

    let mut sessions = log.sessions;
    sessions.retain(|session| {
        if session.is_completed() {
            return true;
        }
        warn!(
            session_id = %session.id,
            started_at = %session.start_time,
            "Discarding session left open by a previous run"
        );
        false
    });
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn completed_session() -> Session {
        let mut session = Session::open_at(Utc::now());
        session.end_time = Some(session.start_time + Duration::seconds(30));
        session
    }

    fn store_in(temp: &TempDir) -> SessionStore {
        SessionStore::load(&temp.path().join("sessions.json"))
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_load_empty_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");
        fs_err::write(&path, "").unwrap();
        assert!(SessionStore::load(&path).all().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");
        fs_err::write(&path, "{not json").unwrap();
        assert!(SessionStore::load(&path).all().is_empty());
    }

    #[test]
    fn test_load_unsupported_version_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");
        fs_err::write(&path, r#"{"version":99,"sessions":[]}"#).unwrap();
        assert!(SessionStore::load(&path).all().is_empty());
    }

    #[test]
    fn test_load_discards_open_sessions() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");

        let open = Session::open_at(Utc::now());
        let open_id = open.id.clone();
        {
            let store = SessionStore::load(&path);
            store.append(completed_session());
            store.append(open);
            store.append(completed_session());
        }

        let reloaded = SessionStore::load(&path);
        let sessions = reloaded.all();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|session| session.is_completed()));
        assert!(sessions.iter().all(|session| session.id != open_id));
    }

    #[test]
    fn test_append_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");
        let session = completed_session();

        SessionStore::load(&path).append(session.clone());

        let reloaded = SessionStore::load(&path);
        assert_eq!(reloaded.all(), vec![session]);
    }

    #[test]
    fn test_append_preserves_insertion_order() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let first = completed_session();
        let second = completed_session();
        let third = completed_session();
        store.append(first.clone());
        store.append(second.clone());
        store.append(third.clone());

        let ids: Vec<String> = store.all().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn test_update_replaces_by_id() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut session = completed_session();
        store.append(session.clone());

        session.synced = true;
        assert!(store.update(&session));
        assert!(store.get(&session.id).unwrap().synced);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.append(completed_session());

        let stranger = completed_session();
        assert!(!store.update(&stranger));
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn test_modify_applies_and_returns_updated_copy() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let session = completed_session();
        store.append(session.clone());

        let updated = store
            .modify(&session.id, |s| {
                s.sync_error = Some("boom".to_string());
                s.sync_attempts += 1;
            })
            .unwrap();

        assert_eq!(updated.sync_error.as_deref(), Some("boom"));
        assert_eq!(updated.sync_attempts, 1);
        assert_eq!(store.get(&session.id).unwrap(), updated);
    }

    #[test]
    fn test_modify_unknown_id_returns_none() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        assert!(store.modify("no-such-id", |s| s.synced = true).is_none());
    }

    #[test]
    fn test_unsynced_filters_completed_unsynced_only() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let pending = completed_session();
        let mut synced = completed_session();
        synced.synced = true;
        let open = Session::open_at(Utc::now());

        store.append(pending.clone());
        store.append(synced);
        store.append(open);

        let unsynced = store.unsynced();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, pending.id);
    }

    #[test]
    fn test_save_failure_keeps_in_memory_state() {
        let temp = TempDir::new().unwrap();
        // Parent of the log path is a file, so directory creation fails and
        // the save is swallowed.
        let blocker = temp.path().join("blocker");
        fs_err::write(&blocker, "x").unwrap();
        let store = SessionStore::load(&blocker.join("sessions.json"));

        let session = completed_session();
        store.append(session.clone());

        assert_eq!(store.all(), vec![session]);
        assert!(!blocker.join("sessions.json").exists());
    }

    #[test]
    fn test_mutations_persist_full_rewrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");

        let store = SessionStore::load(&path);
        let session = completed_session();
        store.append(session.clone());
        store.modify(&session.id, |s| s.synced = true);

        let log: serde_json::Value =
            serde_json::from_str(&fs_err::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(log["version"], 1);
        assert_eq!(log["sessions"].as_array().unwrap().len(), 1);
        assert_eq!(log["sessions"][0]["synced"], true);
    }
}
