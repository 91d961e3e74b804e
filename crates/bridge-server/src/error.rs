// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors raised while configuring or starting a server.

use std::io;
use std::path::PathBuf;

use bridge_buffer::Endpoint;
use bridge_protocol::MessageType;

/// Server setup and lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Neither a Unix socket nor a TCP address was configured.
    #[error("no listener configured (set a unix socket path or a tcp address)")]
    NoListeners,

    /// Binding a listening socket failed.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        /// What we tried to bind.
        endpoint: Endpoint,
        /// Underlying error.
        source: io::Error,
    },

    /// The socket path exists and is not a socket, so it was left alone.
    #[error("refusing to replace {0}: not a socket")]
    NotASocket(PathBuf),

    /// Writing the port discovery file failed.
    #[error("failed to write port file {path}: {source}")]
    PortFile {
        /// Port file path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Restricting the socket file's permissions failed.
    #[error("failed to set permissions on {path}: {source}")]
    Permissions {
        /// Socket path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A handler for this message type is already registered.
    #[error("a handler for {0} is already registered")]
    DuplicateHandler(MessageType),

    /// Responses cannot be served.
    #[error("{0} is a response type and cannot have a handler")]
    NotARequest(MessageType),

    /// A server task panicked or was cancelled.
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
