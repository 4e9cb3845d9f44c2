//! Runtime settings, read once at daemon startup from `~/.worklog/config.toml`.
//!
//! Every key is optional; a missing file or missing key falls back to the
//! defaults below. Components receive the values they need at construction
//! time and never re-read the file, so a running daemon always works from one
//! consistent snapshot.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, WorklogError};
use crate::storage::StorageConfig;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Seconds of silence after which the open session is closed.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    /// Seconds between scheduled background sync runs.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Log filter directives, same syntax as RUST_LOG.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub remote: RemoteSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            log_filter: default_log_filter(),
            remote: RemoteSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteSettings {
    /// Endpoint completed sessions are POSTed to.
    #[serde(default = "default_remote_endpoint")]
    pub endpoint: String,
    /// Per-request timeout for submissions.
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            endpoint: default_remote_endpoint(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

/// Loads settings from `path`, or from the standard location when `None`.
///
/// A missing file is not an error; malformed content is, so the caller can
/// log it and fall back to defaults.
pub fn load(path: Option<PathBuf>) -> Result<Settings> {
    let config_path = match path {
        Some(path) => path,
        None => StorageConfig::resolve()?.config_file(),
    };

    if !config_path.exists() {
        return Ok(Settings::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| WorklogError::Io {
        context: format!("reading config {}", config_path.display()),
        source: err,
    })?;
    toml::from_str::<Settings>(&content).map_err(|err| WorklogError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

fn default_inactivity_timeout_secs() -> u64 {
    60
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_remote_endpoint() -> String {
    "http://127.0.0.1:8090/api/sessions".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    30
}
