// SPDX-License-Identifier: MIT OR Apache-2.0
//! bridge-buffer
//!
//! Byte accumulation and socket plumbing underneath the backup bridge
//! protocol. [`ByteBuffer`] is both the parse cursor for incoming frames and
//! the staging area for outgoing ones; [`BridgeStream`] and [`Endpoint`]
//! cover the two local transports (Unix-domain and loopback TCP).
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod stream;

pub use buffer::{BufferError, ByteBuffer, DEFAULT_CAPACITY};
pub use stream::{BridgeStream, Endpoint, EndpointError};
