// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transport-level protocol errors. Any of these is fatal for the connection
//! that produced it.

use bridge_buffer::BufferError;
use bridge_wire::WireError;

use crate::MessageType;

/// Errors from framing or from resolving a frame to a message type.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The length prefix is below 4 or above the frame limit.
    #[error("invalid frame length {length} (allowed 4..={max})")]
    InvalidLength {
        /// Advertised `totalLength`.
        length: i64,
        /// Configured maximum.
        max: usize,
    },

    /// The type tag names no registered message.
    #[error("unknown message type tag {0}")]
    UnknownMessageType(i32),

    /// Decoding needed more bytes than the frame advertised.
    #[error("{message_type} payload overruns its {payload}-byte frame")]
    Overrun {
        /// Type being decoded.
        message_type: MessageType,
        /// Payload length the frame advertised.
        payload: usize,
    },

    /// The payload was malformed in some other way.
    #[error("failed to decode {message_type}: {source}")]
    Decode {
        /// Type being decoded.
        message_type: MessageType,
        /// Codec error.
        #[source]
        source: WireError,
    },

    /// A message could not be encoded.
    #[error("failed to encode {message_type}: {source}")]
    Encode {
        /// Type being encoded.
        message_type: MessageType,
        /// Codec error.
        #[source]
        source: WireError,
    },

    /// Low-level buffer failure outside payload decoding.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}
