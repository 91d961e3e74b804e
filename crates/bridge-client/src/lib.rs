// SPDX-License-Identifier: MIT OR Apache-2.0
//! bridge-client
//!
//! Client side of the backup bridge. A [`BridgeClient`] holds one
//! connection and performs one call at a time: write the request frame,
//! read the four-byte length, read that many bytes, decode one reply.
//!
//! ```no_run
//! # async fn demo() -> Result<(), bridge_client::ClientError> {
//! use bridge_client::{BridgeClient, Endpoint};
//! use bridge_protocol::Ping;
//!
//! let endpoint: Endpoint = "unix:/run/backup/bridge.sock".parse().expect("endpoint");
//! let client = BridgeClient::connect(&endpoint).await?;
//! let reply = client.call(Ping { payload: Some("hi".into()) }).await?;
//! assert_eq!(reply.payload.as_deref(), Some("hi"));
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;

pub use bridge_buffer::{Endpoint, EndpointError};
pub use client::BridgeClient;
pub use error::ClientError;
