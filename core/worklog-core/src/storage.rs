//! Storage configuration and path management for worklog.
//!
//! Central `StorageConfig` struct that owns every file path worklog touches.
//! Production code resolves `~/.worklog/`; tests inject a temp root with
//! `StorageConfig::with_root()`.

use std::path::{Path, PathBuf};

use crate::error::{Result, WorklogError};

/// Directory under the home directory that holds all worklog data.
pub const DATA_DIR_NAME: &str = ".worklog";

/// Central configuration for all worklog storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all worklog data (default: ~/.worklog)
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the standard layout under the user's home directory.
    pub fn resolve() -> Result<Self> {
        let home = dirs::home_dir().ok_or(WorklogError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(DATA_DIR_NAME),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory for worklog data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to sessions.json (the persisted session log).
    pub fn sessions_file(&self) -> PathBuf {
        self.root.join("sessions.json")
    }

    /// Path to config.toml (runtime settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the daemon's Unix socket.
    pub fn socket_file(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    /// Path to logs/ (client log files).
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the root directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}
