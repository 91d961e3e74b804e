// SPDX-License-Identifier: MIT OR Apache-2.0
//! bridge-server
//!
//! Serves backup bridge requests on a Unix socket and/or loopback TCP.
//!
//! Two tasks run per server. The listener loop accepts sockets and hands
//! them to the I/O loop over an event channel. The I/O loop owns every
//! connection: it waits for readiness on all of them at once, reads into
//! per-connection receive buffers, extracts complete frames and dispatches
//! them. Quick handlers run right there, in frame order. Handlers that
//! declare themselves long-running go to a spawned task; their connection
//! stops parsing until the reply comes back through the same event channel,
//! so each connection has at most one request in flight.
//!
//! Transport and protocol errors drop only the offending connection.
//! Handler errors and panics become a response carrying an
//! [`ErrorInfo`](bridge_protocol::ErrorInfo).
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod handler;
mod io_loop;
mod listener;
mod server;
mod stats;

pub use config::{DEFAULT_POLL_INTERVAL, ServerConfig};
pub use error::ServerError;
pub use handler::{Handler, HandlerError, HandlerRegistry, RequestHandler};
pub use server::{BridgeServer, ServerHandle};
pub use stats::{ServerStats, StatsSnapshot};

/// Re-exported so handler implementations need no direct dependency.
pub use async_trait::async_trait;
