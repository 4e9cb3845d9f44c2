//! Error types for worklog-core operations.
//!
//! Most store and sync paths log their failures and keep going; this type
//! covers the places that do propagate, like settings parsing and the
//! internals of the session log's save path.

use std::path::PathBuf;

/// All errors that can occur in worklog-core operations.
#[derive(Debug, thiserror::Error)]
pub enum WorklogError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using WorklogError.
pub type Result<T> = std::result::Result<T, WorklogError>;

// Conversion for string error compatibility
impl From<WorklogError> for String {
    fn from(err: WorklogError) -> String {
        err.to_string()
    }
}
