//! Worklog daemon entrypoint.
//!
//! A small, single-writer service that owns the session log. It listens on a
//! Unix socket for commands, feeds activity signals into the lifecycle
//! manager, and syncs completed sessions to the remote on a fixed schedule or
//! on demand.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use serde_json::Value;
use worklog_core::events::SessionEvent;
use worklog_core::{
    settings, EventHub, HttpSubmitter, SessionManager, SessionStore, Settings, StorageConfig,
    SyncEngine,
};
use worklog_daemon_protocol::{
    ErrorInfo, Method, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

const SOCKET_ENV: &str = "WORKLOG_DAEMON_SOCKET";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

struct DaemonState {
    manager: Arc<SessionManager>,
    engine: Arc<SyncEngine>,
}

fn main() {
    // Settings feed the log filter, so they load before logging comes up and
    // any load problem is reported right after.
    let storage = StorageConfig::resolve();
    let settings_result = storage
        .as_ref()
        .ok()
        .map(|storage| settings::load(Some(storage.config_file())));

    let default_filter = settings_result
        .as_ref()
        .and_then(|result| result.as_ref().ok())
        .map(|settings| settings.log_filter.clone())
        .unwrap_or_else(|| "info".to_string());
    init_logging(&default_filter);

    let storage = match storage {
        Ok(storage) => storage,
        Err(err) => {
            error!(error = %err, "Failed to resolve storage directories");
            std::process::exit(1);
        }
    };
    if let Err(err) = storage.ensure_dirs() {
        error!(error = %err, "Failed to create storage directories");
        std::process::exit(1);
    }

    let settings = match settings_result {
        Some(Ok(settings)) => settings,
        Some(Err(err)) => {
            warn!(error = %err, "Failed to load settings; using defaults");
            Settings::default()
        }
        None => Settings::default(),
    };

    let socket_path = daemon_socket_path(&storage);
    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }
    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(
        path = %socket_path.display(),
        inactivity_timeout_secs = settings.inactivity_timeout_secs,
        sync_interval_secs = settings.sync_interval_secs,
        endpoint = %settings.remote.endpoint,
        "Worklog daemon started"
    );

    let store = Arc::new(SessionStore::load(&storage.sessions_file()));
    let events = Arc::new(EventHub::new());
    let manager = Arc::new(SessionManager::new(
        Arc::clone(&store),
        Arc::clone(&events),
        Duration::from_secs(settings.inactivity_timeout_secs),
    ));
    manager.spawn_inactivity_watchdog();

    let submitter = match HttpSubmitter::new(
        settings.remote.endpoint.clone(),
        Duration::from_secs(settings.remote.timeout_secs),
    ) {
        Ok(submitter) => Arc::new(submitter),
        Err(err) => {
            error!(error = %err, "Failed to build HTTP submitter");
            std::process::exit(1);
        }
    };
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&manager),
        submitter,
        Arc::clone(&events),
    ));

    spawn_event_logger(&events);
    spawn_sync_scheduler(
        Arc::clone(&engine),
        Duration::from_secs(settings.sync_interval_secs),
    );

    let state = Arc::new(DaemonState { manager, engine });

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&state);
                thread::spawn(|| handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

/// Logs lifecycle and sync events for operators. Transition sites log at
/// debug; this consumer is what makes session activity visible at the
/// default filter.
fn spawn_event_logger(events: &Arc<EventHub>) {
    let rx = events.subscribe();
    thread::spawn(move || {
        for event in rx {
            match event {
                SessionEvent::Started { session } => {
                    info!(session_id = %session.id, "Session started")
                }
                SessionEvent::Ended { session } => info!(
                    session_id = %session.id,
                    duration_secs = session.duration().num_seconds(),
                    "Session ended"
                ),
                SessionEvent::SyncCompleted {
                    synced,
                    failed,
                    duration,
                } => info!(
                    synced,
                    failed,
                    duration_ms = duration.as_millis() as u64,
                    "Sync completed"
                ),
                SessionEvent::SyncFailed { session, error } => info!(
                    session_id = %session.id,
                    attempts = session.sync_attempts,
                    error = %error,
                    "Session sync failed"
                ),
            }
        }
    });
}

fn spawn_sync_scheduler(engine: Arc<SyncEngine>, interval: Duration) {
    if interval.is_zero() {
        info!("Background sync disabled (sync_interval_secs = 0)");
        return;
    }
    thread::spawn(move || loop {
        thread::sleep(interval);
        match engine.sync_all() {
            Some(report) => debug!(
                synced = report.synced,
                failed = report.failed,
                "Scheduled sync finished"
            ),
            None => debug!("Scheduled sync skipped; another run in flight"),
        }
    });
}

fn init_logging(default_filter: &str) {
    let debug_enabled = env::var("WORKLOG_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn daemon_socket_path(storage: &StorageConfig) -> PathBuf {
    match env::var(SOCKET_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => storage.socket_file(),
    }
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<DaemonState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error(None, &err.code, err.message);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, state);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => {
            if buffer.len() > index + 1 {
                let trailing = &buffer[index + 1..];
                if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!("Extra bytes detected after newline; ignoring trailing data");
                }
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, state: Arc<DaemonState>) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => {
            let data = serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "active_session_id": state.manager.current_session().map(|s| s.id),
                "pending_sync": state.manager.unsynced_sessions().len(),
            });
            Response::ok(request.id, data)
        }
        Method::Activity => {
            state.manager.record_activity();
            Response::ok(request.id, serde_json::json!({"accepted": true}))
        }
        Method::StartSession => match state.manager.start_session() {
            Some(session) => json_response(request.id, &session),
            None => Response::error(request.id, "unavailable", "session manager is stopped"),
        },
        // Ending while idle is a no-op: null data, not an error.
        Method::EndSession => match state.manager.end_session() {
            Some(session) => json_response(request.id, &session),
            None => Response::ok(request.id, Value::Null),
        },
        Method::SyncNow => match state.engine.sync_all() {
            Some(report) => json_response(request.id, &report),
            None => Response::ok(request.id, serde_json::json!({"skipped": true})),
        },
        Method::GetSessions => {
            let sessions = state.manager.all_sessions();
            debug!(sessions = sessions.len(), "Sessions snapshot");
            json_response(request.id, &sessions)
        }
        Method::GetStats => json_response(request.id, &state.engine.statistics()),
    }
}

fn json_response<T: serde::Serialize>(id: Option<String>, data: &T) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize response: {}", err),
        ),
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
