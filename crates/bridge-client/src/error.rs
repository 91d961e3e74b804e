// SPDX-License-Identifier: MIT OR Apache-2.0

use bridge_buffer::Endpoint;
use bridge_protocol::{ErrorInfo, MessageType, ProtocolError};

/// Errors returned by [`BridgeClient`](crate::BridgeClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The endpoint could not be reached.
    #[error("failed to connect to {endpoint}")]
    Connect {
        /// Target of the attempt.
        endpoint: Endpoint,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The socket failed mid-call. The client is unusable afterwards.
    #[error("bridge connection failed")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("bridge protocol error")]
    Protocol(#[from] ProtocolError),

    /// The server handled the call and reported a failure.
    #[error(transparent)]
    Remote(ErrorInfo),

    /// An earlier transport failure closed this client.
    #[error("client is disconnected; reconnect to continue")]
    Disconnected,

    /// The reply was not the request's declared response type.
    #[error("expected {expected} in reply, got {actual}")]
    UnexpectedResponse {
        /// Declared response type.
        expected: MessageType,
        /// Type that arrived.
        actual: MessageType,
    },

    /// One-way requests are never answered; use `send_one_way`.
    #[error("{0} is one-way and receives no reply")]
    OneWay(MessageType),

    /// `send_one_way` was given a request that expects a reply.
    #[error("{0} expects a reply")]
    NotOneWay(MessageType),

    /// Only requests can be sent.
    #[error("{0} is not a request")]
    NotARequest(MessageType),
}

impl ClientError {
    /// `true` for failures that closed the connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Io(_) | Self::Protocol(_) | Self::Disconnected
        )
    }

    /// The remote failure, if this is one.
    pub fn remote(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Remote(info) => Some(info),
            _ => None,
        }
    }
}
