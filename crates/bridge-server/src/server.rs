// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`BridgeServer`] startup and the [`ServerHandle`] used to stop it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_buffer::Endpoint;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::io_loop::{Context, IoLoop};
use crate::{HandlerRegistry, ServerConfig, ServerError, ServerStats, listener};

/// A configured, not yet running server.
#[derive(Debug)]
pub struct BridgeServer {
    config: ServerConfig,
    registry: HandlerRegistry,
    stats: Arc<ServerStats>,
}

impl BridgeServer {
    /// Server with fresh statistics.
    pub fn new(config: ServerConfig, registry: HandlerRegistry) -> Self {
        Self {
            config,
            registry,
            stats: Arc::new(ServerStats::new()),
        }
    }

    /// Use shared statistics, e.g. so a handler can report them.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<ServerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Statistics this server will update.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Bind every listener and spawn the listener and I/O loops.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let BridgeServer {
            config,
            registry,
            stats,
        } = self;
        let bound = listener::bind(&config).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener_task = tokio::spawn(listener::run(
            bound.listeners,
            events_tx.clone(),
            shutdown_rx.clone(),
            config.poll_interval,
        ));
        let io_loop = IoLoop::new(
            Context {
                registry,
                stats: Arc::clone(&stats),
                events: events_tx,
                max_frame_bytes: config.max_frame_bytes,
            },
            events_rx,
            shutdown_rx,
            config.poll_interval,
        );
        let io_task = tokio::spawn(io_loop.run());

        info!(target: "bridge.server", endpoints = bound.endpoints.len(), "bridge server started");
        Ok(ServerHandle {
            shutdown: shutdown_tx,
            listener_task,
            io_task,
            endpoints: bound.endpoints,
            cleanup: bound.cleanup,
            stats,
        })
    }
}

/// A running server.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also
/// stops both loops, but leaves the socket and port files behind.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
    listener_task: JoinHandle<()>,
    io_task: JoinHandle<()>,
    endpoints: Vec<Endpoint>,
    cleanup: Vec<PathBuf>,
    stats: Arc<ServerStats>,
}

impl ServerHandle {
    /// Every bound endpoint, with TCP ports resolved.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// The bound TCP address, if listening on TCP.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.endpoints.iter().find_map(|e| match e {
            Endpoint::Tcp(addr) => Some(*addr),
            Endpoint::Unix(_) => None,
        })
    }

    /// The Unix socket path, if listening on one.
    pub fn unix_path(&self) -> Option<&Path> {
        self.endpoints.iter().find_map(|e| match e {
            Endpoint::Unix(path) => Some(path.as_path()),
            Endpoint::Tcp(_) => None,
        })
    }

    /// Live statistics.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Signal both loops, wait for them, drop all connections and remove the
    /// socket and port files.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        // Receivers may already be gone if a loop exited on its own.
        let _ = self.shutdown.send(true);
        let listener = self.listener_task.await;
        let io = self.io_task.await;
        for path in &self.cleanup {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(target: "bridge.server", path = %path.display(), "removed"),
                Err(e) => debug!(target: "bridge.server", path = %path.display(), error = %e, "cleanup skipped"),
            }
        }
        listener?;
        io?;
        info!(target: "bridge.server", "bridge server stopped");
        Ok(())
    }
}
