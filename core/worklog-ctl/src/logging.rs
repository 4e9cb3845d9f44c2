//! File-backed tracing for worklog-ctl.
//!
//! Stdout carries command output, so logs go to a file under the worklog
//! home instead. The returned guard must stay alive until exit so buffered
//! lines are flushed.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use worklog_core::StorageConfig;

const LOG_FILE: &str = "worklog-ctl.log";

pub fn init() -> Option<WorkerGuard> {
    let storage = StorageConfig::resolve().ok()?;
    let log_dir = storage.log_dir();
    fs_err::create_dir_all(&log_dir).ok()?;

    let appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;

    Some(guard)
}
