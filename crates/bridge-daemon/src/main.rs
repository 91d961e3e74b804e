// SPDX-License-Identifier: MIT OR Apache-2.0
use std::path::PathBuf;

use anyhow::{Context, Result};
use bridge_config::{BridgeConfig, load_config, merge_configs, validate_config};
use bridge_daemon::Daemon;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "backup-bridged", version, about = "Backup bridge daemon")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Unix socket path to listen on.
    #[arg(long)]
    socket: Option<String>,

    /// TCP address to listen on, e.g. 127.0.0.1:0.
    #[arg(long)]
    tcp: Option<String>,

    /// File receiving the bound TCP port.
    #[arg(long)]
    port_file: Option<String>,

    /// Directory covered by monitoring and rescans (repeatable).
    #[arg(long = "watch-root")]
    watch_roots: Vec<String>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

impl Args {
    /// Flags as a config overlay; unset flags leave the file's values alone.
    fn overlay(&self) -> BridgeConfig {
        BridgeConfig {
            unix_socket: self.socket.clone(),
            tcp_bind: self.tcp.clone(),
            port_file: self.port_file.clone(),
            log_level: None,
            watch_roots: self.watch_roots.clone(),
            ..BridgeConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = load_config(args.config.as_deref()).context("load configuration")?;
    let config = merge_configs(file, args.overlay());

    let filter = if args.debug {
        EnvFilter::new("bridge=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("bridge={}", config.log_level())))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    for warning in validate_config(&config).context("invalid configuration")? {
        warn!(target: "bridge.daemon", "{warning}");
    }

    let daemon = Daemon::start(&config).await?;
    for endpoint in daemon.handle().endpoints() {
        info!(target: "bridge.daemon", %endpoint, "listening");
    }

    tokio::signal::ctrl_c()
        .await
        .context("wait for ctrl-c")?;
    info!(target: "bridge.daemon", "shutting down");
    daemon.shutdown().await
}
