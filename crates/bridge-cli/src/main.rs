// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bridge_cli::commands;
use bridge_cli::format::Formatter;
use bridge_client::{BridgeClient, ClientError, Endpoint};
use bridge_protocol::NotificationKind;
use chrono::TimeDelta;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "backup-bridge", version, about = "Backup bridge CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon endpoint: unix:/path, tcp:host:port, a socket path or host:port.
    #[arg(long, global = true)]
    endpoint: Option<Endpoint>,

    /// Read the daemon's TCP port from this file.
    #[arg(long, global = true)]
    port_file: Option<PathBuf>,

    /// Print replies as JSON, one object per line.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the daemon answers.
    Ping {
        /// Text echoed back by the daemon.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Report whether a path lies under a watched root.
    CheckPath {
        /// Absolute path to check.
        path: String,
    },

    /// Rescan a watched root and wait for it to finish.
    Rescan {
        /// Root to rescan.
        root: String,

        /// Re-read every file.
        #[arg(long)]
        full: bool,
    },

    /// Switch filesystem monitoring on or off.
    Monitor {
        #[arg(value_enum)]
        state: MonitorState,
    },

    /// Show server counters.
    Stats,

    /// Fetch notifications from the daemon.
    Notifications {
        /// Only notifications with an id greater than this.
        #[arg(long, default_value_t = 0)]
        since: i64,

        /// Seconds to wait for something new.
        #[arg(long, default_value_t = 5)]
        timeout: u32,

        /// Keep polling until interrupted.
        #[arg(long)]
        follow: bool,
    },

    /// Post a notification to the bus.
    Post {
        /// Summary text.
        message: String,

        /// info | warning | error | rescan-started | rescan-completed | monitoring-changed
        #[arg(long, default_value = "info")]
        kind: NotificationKind,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MonitorState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("bridge=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bridge=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let fmt = Formatter::from_flag(cli.json);
    match run(cli, &fmt).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ClientError>().and_then(ClientError::remote) {
                Some(info) => eprintln!("{}", fmt.remote_error(info)),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, fmt: &Formatter) -> Result<()> {
    let endpoint = commands::resolve_endpoint(cli.endpoint, cli.port_file.as_deref())?;
    debug!(target: "bridge.cli", %endpoint, "connecting");
    let client = BridgeClient::connect(&endpoint).await?;

    let output = match cli.command {
        Commands::Ping { payload } => commands::ping(&client, fmt, payload).await?,
        Commands::CheckPath { path } => commands::check_path(&client, fmt, &path).await?,
        Commands::Rescan { root, full } => commands::rescan(&client, fmt, &root, full).await?,
        Commands::Monitor { state } => {
            commands::set_monitoring(&client, fmt, matches!(state, MonitorState::On)).await?
        }
        Commands::Stats => commands::statistics(&client, fmt).await?,
        Commands::Notifications {
            since,
            timeout,
            follow: false,
        } => commands::notifications(&client, fmt, since, seconds(timeout)).await?,
        Commands::Notifications {
            since,
            timeout,
            follow: true,
        } => return follow(&client, fmt, since, seconds(timeout)).await,
        Commands::Post { message, kind } => commands::post(&client, kind, &message).await?,
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn seconds(secs: u32) -> TimeDelta {
    TimeDelta::seconds(i64::from(secs))
}

/// Print notifications as they arrive until Ctrl-C.
async fn follow(
    client: &BridgeClient,
    fmt: &Formatter,
    since: i64,
    timeout: TimeDelta,
) -> Result<()> {
    let mut last_seen = since;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("wait for ctrl-c")?;
                return Ok(());
            }
            received = commands::poll_notifications(client, last_seen, timeout) => {
                for n in received? {
                    last_seen = last_seen.max(n.id);
                    println!("{}", fmt.notification(&n));
                }
            }
        }
    }
}
