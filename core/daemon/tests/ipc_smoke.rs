use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use worklog_daemon_protocol::{Method, Request, Response, PROTOCOL_VERSION};

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_worklog-daemon"))
        .env("HOME", home)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn worklog-daemon")
}

fn socket_path(home: &Path) -> PathBuf {
    home.join(".worklog").join("daemon.sock")
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() && UnixStream::connect(path).is_ok() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn request(method: Method, id: &str) -> Request {
    Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(id.to_string()),
        params: None,
    }
}

fn send_request(socket: &Path, request: Request) -> Response {
    let mut stream = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
    serde_json::to_writer(&mut stream, &request).expect("Failed to serialize request");
    stream.write_all(b"\n").expect("Failed to write request");
    stream.flush().ok();
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("Failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("Failed to parse response JSON")
}

fn sessions_array(socket: &Path, id: &str) -> Vec<serde_json::Value> {
    let response = send_request(socket, request(Method::GetSessions, id));
    assert!(response.ok, "sessions response was not ok");
    response
        .data
        .expect("sessions payload")
        .as_array()
        .expect("sessions payload is array")
        .clone()
}

#[test]
fn daemon_ipc_session_lifecycle_smoke() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let _guard = DaemonGuard { child };

    wait_for_socket(&socket, Duration::from_secs(5));

    let health = send_request(&socket, request(Method::GetHealth, "health-check"));
    assert!(health.ok, "health response was not ok");
    let data = health.data.expect("health payload");
    assert_eq!(data.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert!(data.get("active_session_id").map_or(false, |v| v.is_null()));
    assert_eq!(data.get("pending_sync").and_then(|v| v.as_u64()), Some(0));

    // An activity signal opens a session.
    let activity = send_request(&socket, request(Method::Activity, "activity-1"));
    assert!(activity.ok, "activity response was not ok");
    assert_eq!(
        activity
            .data
            .as_ref()
            .and_then(|data| data.get("accepted"))
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    let health = send_request(&socket, request(Method::GetHealth, "health-active"));
    let active_id = health
        .data
        .as_ref()
        .and_then(|data| data.get("active_session_id"))
        .and_then(|v| v.as_str())
        .expect("an activity signal should have opened a session")
        .to_string();

    let sessions = sessions_array(&socket, "sessions-open");
    assert_eq!(sessions.len(), 1);
    assert_eq!(
        sessions[0].get("id").and_then(|v| v.as_str()),
        Some(active_id.as_str())
    );
    assert!(sessions[0].get("end_time").map_or(false, |v| v.is_null()));
    assert_eq!(sessions[0].get("synced").and_then(|v| v.as_bool()), Some(false));

    // Repeated signals must not open a second session.
    for n in 0..5 {
        send_request(&socket, request(Method::Activity, &format!("activity-{}", n)));
    }
    assert_eq!(sessions_array(&socket, "sessions-flood").len(), 1);

    // Explicit end closes the open session.
    let ended = send_request(&socket, request(Method::EndSession, "end-1"));
    assert!(ended.ok, "end response was not ok");
    let ended_data = ended.data.expect("ended session payload");
    assert_eq!(
        ended_data.get("id").and_then(|v| v.as_str()),
        Some(active_id.as_str())
    );
    assert!(ended_data.get("end_time").map_or(false, |v| !v.is_null()));

    // Ending again is a no-op, reported as null data rather than an error.
    let noop = send_request(&socket, request(Method::EndSession, "end-2"));
    assert!(noop.ok, "no-op end response was not ok");
    assert!(noop.data.map_or(false, |v| v.is_null()));

    // The completed session now counts as pending sync.
    let stats = send_request(&socket, request(Method::GetStats, "stats-1"));
    assert!(stats.ok, "stats response was not ok");
    let stats_data = stats.data.expect("stats payload");
    assert_eq!(stats_data.get("total_sessions").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(stats_data.get("synced_sessions").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(stats_data.get("unsynced_sessions").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(stats_data.get("failed_sessions").and_then(|v| v.as_u64()), Some(0));
    assert!(stats_data
        .get("last_successful_sync")
        .map_or(false, |v| v.is_null()));

    // An explicit start opens a distinct second session.
    let started = send_request(&socket, request(Method::StartSession, "start-1"));
    assert!(started.ok, "start response was not ok");
    let started_id = started
        .data
        .as_ref()
        .and_then(|data| data.get("id"))
        .and_then(|v| v.as_str())
        .expect("started session id")
        .to_string();
    assert_ne!(started_id, active_id);

    // Starting while active returns the same open session.
    let repeat = send_request(&socket, request(Method::StartSession, "start-2"));
    assert_eq!(
        repeat
            .data
            .as_ref()
            .and_then(|data| data.get("id"))
            .and_then(|v| v.as_str()),
        Some(started_id.as_str())
    );
    assert_eq!(sessions_array(&socket, "sessions-final").len(), 2);
}

#[test]
fn daemon_rejects_unsupported_protocol_version() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let _guard = DaemonGuard { child };

    wait_for_socket(&socket, Duration::from_secs(5));

    let response = send_request(
        &socket,
        Request {
            protocol_version: PROTOCOL_VERSION + 1,
            method: Method::GetHealth,
            id: Some("future-version".to_string()),
            params: None,
        },
    );
    assert!(!response.ok);
    assert_eq!(
        response.error.as_ref().map(|err| err.code.as_str()),
        Some("protocol_mismatch")
    );
}

#[test]
fn daemon_restart_discards_open_session() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });

    wait_for_socket(&socket, Duration::from_secs(5));

    send_request(&socket, request(Method::Activity, "activity-before-crash"));
    assert_eq!(sessions_array(&socket, "sessions-before-crash").len(), 1);

    // Kill without any shutdown handshake; the open session stays open on
    // disk and must be dropped by the next load.
    drop(guard.take());

    guard = Some(DaemonGuard {
        child: spawn_daemon(home.path()),
    });
    wait_for_socket(&socket, Duration::from_secs(5));

    assert!(
        sessions_array(&socket, "sessions-after-restart").is_empty(),
        "open session should be discarded on restart"
    );

    drop(guard.take());
}
