// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bridge_protocol::DEFAULT_MAX_FRAME_BYTES;

/// Default bound on each readiness wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Where and how a [`BridgeServer`](crate::BridgeServer) listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Unix-domain socket path.
    pub unix_socket: Option<PathBuf>,
    /// TCP bind address; port 0 picks a free port.
    pub tcp_bind: Option<SocketAddr>,
    /// File receiving the bound TCP port, for discovery by local clients.
    pub port_file: Option<PathBuf>,
    /// Upper bound on each readiness wait, for shutdown and reaping.
    pub poll_interval: Duration,
    /// Largest accepted frame (`totalLength`).
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            unix_socket: None,
            tcp_bind: None,
            port_file: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl ServerConfig {
    /// Listen on a Unix socket.
    #[must_use]
    pub fn with_unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    /// Listen on TCP.
    #[must_use]
    pub fn with_tcp(mut self, addr: SocketAddr) -> Self {
        self.tcp_bind = Some(addr);
        self
    }

    /// Publish the bound TCP port to `path`.
    #[must_use]
    pub fn with_port_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.port_file = Some(path.into());
        self
    }

    /// Override the readiness wait bound.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the frame size limit.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }
}
