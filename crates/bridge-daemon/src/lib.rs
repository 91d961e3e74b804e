// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]
/// Built-in request handlers.
pub mod handlers;
mod state;

use std::sync::Arc;

use anyhow::Context;
use bridge_config::{BridgeConfig, ConfigError};
use bridge_server::{BridgeServer, HandlerRegistry, ServerConfig, ServerError, ServerHandle};
use tracing::info;

pub use state::DaemonState;

use handlers::{
    CheckPathHandler, GetStatisticsHandler, PingHandler, PostNotificationHandler,
    ReceiveNotificationsHandler, SetMonitoringHandler, StartRescanHandler,
};

/// A registry holding every built-in handler, sharing `state`.
pub fn build_registry(state: &Arc<DaemonState>) -> Result<HandlerRegistry, ServerError> {
    let mut registry = HandlerRegistry::new();
    registry
        .register(PingHandler(Arc::clone(state)))?
        .register(CheckPathHandler(Arc::clone(state)))?
        .register(StartRescanHandler(Arc::clone(state)))?
        .register(SetMonitoringHandler(Arc::clone(state)))?
        .register(GetStatisticsHandler(Arc::clone(state)))?
        .register(ReceiveNotificationsHandler(Arc::clone(state)))?
        .register(PostNotificationHandler(Arc::clone(state)))?;
    Ok(registry)
}

/// Server settings derived from `config`.
pub fn server_config(config: &BridgeConfig) -> Result<ServerConfig, ConfigError> {
    Ok(ServerConfig {
        unix_socket: config.unix_socket_path(),
        tcp_bind: config.tcp_addr()?,
        port_file: config.port_file_path(),
        poll_interval: config.poll_interval(),
        max_frame_bytes: config.max_frame_bytes(),
    })
}

/// A running daemon.
#[derive(Debug)]
pub struct Daemon {
    handle: ServerHandle,
    state: Arc<DaemonState>,
}

impl Daemon {
    /// Bind the configured listeners and start serving.
    pub async fn start(config: &BridgeConfig) -> anyhow::Result<Self> {
        let state = Arc::new(DaemonState::from_config(config));
        let registry = build_registry(&state)?;
        let server_config = server_config(config)?;
        let handle = BridgeServer::new(server_config, registry)
            .with_stats(Arc::clone(state.stats()))
            .start()
            .await
            .context("start bridge server")?;
        info!(
            target: "bridge.daemon",
            watch_roots = state.watch_roots().len(),
            "daemon ready"
        );
        Ok(Self { handle, state })
    }

    /// The running server.
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Shared handler state.
    pub fn state(&self) -> &Arc<DaemonState> {
        &self.state
    }

    /// Stop serving and remove the socket and port files.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.handle.shutdown().await.context("stop bridge server")
    }
}
