// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-connection state owned by the I/O loop.

use bridge_buffer::{BridgeStream, ByteBuffer};

/// Connection identifier, unique for the life of a server.
pub(crate) type ConnId = u64;

/// One accepted socket and its buffers.
///
/// `processing` is set while a long-running request from this connection is
/// out on a worker; no further frames are parsed until it clears. `dead` is
/// set on any I/O or protocol error and on orderly close, and the loop reaps
/// the connection on its next pass.
#[derive(Debug)]
pub(crate) struct Connection {
    pub id: ConnId,
    pub peer: String,
    pub stream: BridgeStream,
    pub recv: ByteBuffer,
    pub send: ByteBuffer,
    pub processing: bool,
    pub dead: bool,
    pub peer_closed: bool,
}

impl Connection {
    pub fn new(id: ConnId, stream: BridgeStream) -> Self {
        Self {
            id,
            peer: stream.peer_label(),
            stream,
            recv: ByteBuffer::new(),
            send: ByteBuffer::new(),
            processing: false,
            dead: false,
            peer_closed: false,
        }
    }
}
