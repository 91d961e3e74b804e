// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`BridgeClient`]: one connection, one call at a time.

use bridge_buffer::{BridgeStream, ByteBuffer, Endpoint};
use bridge_protocol::{
    DEFAULT_MAX_FRAME_BYTES, Envelope, FrameDecode, LENGTH_PREFIX, MessageKind, ProtocolError,
    Request, Response, TAG_LEN, decode_frame, encode_frame_limited,
};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::ClientError;

struct Channel {
    stream: BridgeStream,
    scratch: ByteBuffer,
}

/// A connected client.
///
/// Calls are serialised by an internal lock held for the whole exchange,
/// so a shared client is safe to use from several tasks but never has more
/// than one request outstanding. Callers wanting concurrency open one
/// client each.
///
/// After a transport failure, or a call whose future was dropped before its
/// reply arrived, every further call returns [`ClientError::Disconnected`];
/// connect again to continue.
pub struct BridgeClient {
    endpoint: Endpoint,
    max_frame_bytes: usize,
    channel: Mutex<Option<Channel>>,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("endpoint", &self.endpoint)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    /// Open a connection to `endpoint`.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, ClientError> {
        let stream = BridgeStream::connect(endpoint)
            .await
            .map_err(|source| ClientError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;
        debug!(target: "bridge.client", endpoint = %endpoint, "connected");
        Ok(Self {
            endpoint: endpoint.clone(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            channel: Mutex::new(Some(Channel {
                stream,
                scratch: ByteBuffer::new(),
            })),
        })
    }

    /// Override the largest reply frame accepted.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// The connected endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// `false` once a transport failure has closed the connection.
    pub async fn is_connected(&self) -> bool {
        self.channel.lock().await.is_some()
    }

    /// Send a request and wait for its typed response.
    ///
    /// A response carrying an [`ErrorInfo`](bridge_protocol::ErrorInfo) is
    /// returned as [`ClientError::Remote`].
    pub async fn call<R: Request>(&self, request: R) -> Result<R::Response, ClientError> {
        let reply = self.send_request_and_receive_response(request.into()).await?;
        let response = R::Response::try_from(reply).map_err(|other| {
            ClientError::UnexpectedResponse {
                expected: <R::Response as bridge_protocol::Message>::MESSAGE_TYPE,
                actual: other.message_type(),
            }
        })?;
        match response.error() {
            Some(error) => Err(ClientError::Remote(error.clone())),
            None => Ok(response),
        }
    }

    /// Send a one-way request. Returns once the bytes are written.
    pub async fn send_one_way<R: Request>(&self, request: R) -> Result<(), ClientError> {
        let envelope: Envelope = request.into();
        let message_type = envelope.message_type();
        if !message_type.is_one_way() {
            return Err(ClientError::NotOneWay(message_type));
        }

        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(ClientError::Disconnected)?;
        channel.scratch.clear();
        encode_frame_limited(&envelope, &mut channel.scratch, self.max_frame_bytes)?;
        trace!(target: "bridge.client", message_type = message_type.name(), bytes = channel.scratch.len(), "sending one-way");

        // Out of the slot while writing, so a cancelled send leaves the
        // client disconnected rather than mid-frame.
        let Some(mut channel) = guard.take() else {
            return Err(ClientError::Disconnected);
        };
        let Channel { stream, scratch } = &mut channel;
        scratch.send_fully(stream).await?;
        *guard = Some(channel);
        Ok(())
    }

    /// Send a request envelope and return the reply envelope as received,
    /// error slot included.
    pub async fn send_request_and_receive_response(
        &self,
        request: Envelope,
    ) -> Result<Envelope, ClientError> {
        let message_type = request.message_type();
        if message_type.kind() != MessageKind::Request {
            return Err(ClientError::NotARequest(message_type));
        }
        let Some(expected) = message_type.response_type() else {
            return Err(ClientError::NotARequest(message_type));
        };
        if message_type.is_one_way() {
            return Err(ClientError::OneWay(message_type));
        }

        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(ClientError::Disconnected)?;
        channel.scratch.clear();
        encode_frame_limited(&request, &mut channel.scratch, self.max_frame_bytes)?;
        trace!(target: "bridge.client", message_type = message_type.name(), bytes = channel.scratch.len(), "sending request");

        // Restored only once the reply is read. A cancelled call drops the
        // channel with its reply still unread.
        let Some(mut channel) = guard.take() else {
            return Err(ClientError::Disconnected);
        };
        let reply = match channel.exchange(self.max_frame_bytes).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(target: "bridge.client", endpoint = %self.endpoint, error = %e, "connection lost");
                return Err(e);
            }
        };
        *guard = Some(channel);
        drop(guard);

        if reply.message_type() != expected {
            return Err(ClientError::UnexpectedResponse {
                expected,
                actual: reply.message_type(),
            });
        }
        Ok(reply)
    }
}

impl Channel {
    /// Write the encoded request in `scratch`, then read exactly one frame.
    async fn exchange(&mut self, max_frame_bytes: usize) -> Result<Envelope, ClientError> {
        self.scratch.send_fully(&mut self.stream).await?;

        self.scratch.clear();
        self.scratch
            .receive_from(&mut self.stream, LENGTH_PREFIX)
            .await?;
        let total = self.scratch.peek_i32().unwrap_or_default();
        let body = usize::try_from(total)
            .ok()
            .filter(|&n| n >= TAG_LEN && n <= max_frame_bytes)
            .ok_or(ProtocolError::InvalidLength {
                length: i64::from(total),
                max: max_frame_bytes,
            })?;
        self.scratch.receive_from(&mut self.stream, body).await?;

        match decode_frame(&mut self.scratch, max_frame_bytes)? {
            FrameDecode::Frame(envelope) => {
                trace!(target: "bridge.client", message_type = envelope.message_type().name(), "received reply");
                Ok(envelope)
            }
            FrameDecode::Incomplete => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "reply frame incomplete",
            ))),
        }
    }
}
