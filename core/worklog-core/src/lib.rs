//! # worklog-core
//!
//! Core library for worklog, providing the session lifecycle and sync engine
//! shared by all clients (daemon, CLI).
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The daemon wraps calls in
//!   threads where it needs concurrency.
//! - **Single writer**: One process owns the session log; the manager is the
//!   only component that opens and closes sessions.
//! - **Graceful degradation**: Missing or corrupt files load as empty state,
//!   and save failures are logged and swallowed instead of crashing callers.
//! - **Failures travel through data, not errors**: sync outcomes land on the
//!   session records and on emitted events; `sync_all` never raises.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use worklog_core::{EventHub, SessionManager, SessionStore, StorageConfig};
//!
//! let storage = StorageConfig::resolve()?;
//! let store = Arc::new(SessionStore::load(&storage.sessions_file()));
//! let events = Arc::new(EventHub::new());
//! let manager = Arc::new(SessionManager::new(store, events, Duration::from_secs(60)));
//! manager.spawn_inactivity_watchdog();
//! manager.record_activity();
//! ```

// Public modules
pub mod error;
pub mod events;
pub mod manager;
pub mod session;
pub mod settings;
pub mod storage;
pub mod store;
pub mod submit;
pub mod sync;

// Re-export commonly used items at crate root
pub use error::{Result, WorklogError};
pub use events::{EventHub, SessionEvent};
pub use manager::SessionManager;
pub use session::Session;
pub use settings::{RemoteSettings, Settings};
pub use storage::StorageConfig;
pub use store::SessionStore;
pub use submit::{HttpSubmitter, RemoteSubmitter, SubmitError, SubmitRequest, SubmitResponse};
pub use sync::{SyncEngine, SyncReport, SyncStatistics};
