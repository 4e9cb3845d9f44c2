//! worklog-ctl: CLI client for the worklog daemon.
//!
//! The adapter an external activity source shells out to, plus manual
//! control and inspection commands. Every subcommand maps to one daemon
//! method over the Unix socket; the daemon's JSON payload is printed to
//! stdout, so logging goes to a file instead.
//!
//! ## Subcommands
//!
//! - `signal`: Report one activity signal (starts a session if none is open)
//! - `start` / `end`: Explicit session control
//! - `sync`: Push unsynced sessions to the remote endpoint now
//! - `sessions` / `stats` / `health`: Inspection

mod client;
mod logging;

use clap::{Parser, Subcommand};
use worklog_daemon_protocol::Method;

#[derive(Parser)]
#[command(name = "worklog-ctl")]
#[command(about = "Worklog session tracker control")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report an activity signal (starts a session if none is open)
    Signal,

    /// Start a session explicitly
    Start,

    /// End the open session
    End,

    /// Sync unsynced sessions to the remote endpoint now
    Sync,

    /// List recorded sessions
    Sessions,

    /// Show aggregate session statistics
    Stats,

    /// Check daemon health
    Health,
}

impl Commands {
    fn method(&self) -> Method {
        match self {
            Commands::Signal => Method::Activity,
            Commands::Start => Method::StartSession,
            Commands::End => Method::EndSession,
            Commands::Sync => Method::SyncNow,
            Commands::Sessions => Method::GetSessions,
            Commands::Stats => Method::GetStats,
            Commands::Health => Method::GetHealth,
        }
    }
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    // Kill switch for callers embedded in activity-source hooks: exit
    // cleanly instead of failing when the daemon is not in use.
    if !client::daemon_enabled() {
        tracing::warn!("Daemon client disabled via {}, skipping", client::ENABLE_ENV);
        return;
    }

    match client::send_command(cli.command.method()) {
        Ok(data) => {
            let rendered =
                serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
            println!("{}", rendered);
        }
        Err(err) => {
            tracing::error!(error = %err, "worklog-ctl command failed");
            eprintln!("worklog-ctl: {}", err);
            std::process::exit(1);
        }
    }
}
