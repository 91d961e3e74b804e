// SPDX-License-Identifier: MIT OR Apache-2.0
//! The I/O loop: sole owner of every connection's sockets and buffers.
//!
//! Each pass reaps dead connections, then waits for the first of: readiness
//! on any live connection (read interest always, write interest while output
//! is pending), an event from the listener or a worker, shutdown, or the
//! poll interval. It then drains queued events and services every live
//! connection without blocking: one send attempt, reads until the socket
//! runs dry, and frame parsing until a frame is incomplete or a long-running
//! request is out on a worker.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bridge_buffer::{BridgeStream, ByteBuffer};
use bridge_protocol::{
    Envelope, FrameDecode, ProtocolError, decode_frame, encode_frame_limited,
};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::io::{Interest, Ready};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::connection::{ConnId, Connection};
use crate::handler::dispatch;
use crate::{HandlerRegistry, ServerStats};

/// Bytes requested per non-blocking read.
const READ_CHUNK: usize = 64 * 1024;

/// Reads attempted per connection per pass, so one busy peer cannot starve
/// the rest.
const MAX_READS_PER_PASS: usize = 16;

/// Messages into the I/O loop from the listener and from workers.
#[derive(Debug)]
pub(crate) enum LoopEvent {
    /// A new connection to adopt.
    Accepted(BridgeStream),
    /// A long-running request finished; `outcome` holds its encoded reply.
    Completed {
        conn: ConnId,
        outcome: Result<Option<ByteBuffer>, ProtocolError>,
    },
}

/// Shared, read-only state used while servicing connections.
pub(crate) struct Context {
    pub registry: HandlerRegistry,
    pub stats: Arc<ServerStats>,
    pub events: mpsc::UnboundedSender<LoopEvent>,
    pub max_frame_bytes: usize,
}

enum Wake {
    Shutdown,
    Event(LoopEvent),
    Ready(ConnId, io::Result<Ready>),
    Tick,
}

pub(crate) struct IoLoop {
    ctx: Context,
    conns: BTreeMap<ConnId, Connection>,
    events: mpsc::UnboundedReceiver<LoopEvent>,
    shutdown: watch::Receiver<bool>,
    poll_interval: Duration,
    next_id: ConnId,
}

impl IoLoop {
    pub fn new(
        ctx: Context,
        events: mpsc::UnboundedReceiver<LoopEvent>,
        shutdown: watch::Receiver<bool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ctx,
            conns: BTreeMap::new(),
            events,
            shutdown,
            poll_interval,
            next_id: 1,
        }
    }

    pub async fn run(mut self) {
        loop {
            self.reap();
            if *self.shutdown.borrow() {
                break;
            }

            let wake = {
                let mut waits: FuturesUnordered<_> = self
                    .conns
                    .values()
                    .map(|c| {
                        let interest = if c.send.is_empty() {
                            Interest::READABLE
                        } else {
                            Interest::READABLE | Interest::WRITABLE
                        };
                        async move { (c.id, c.stream.ready(interest).await) }
                    })
                    .collect();

                tokio::select! {
                    changed = self.shutdown.changed() => match changed {
                        Ok(()) => Wake::Tick,
                        Err(_) => Wake::Shutdown,
                    },
                    Some(event) = self.events.recv() => Wake::Event(event),
                    Some((id, ready)) = waits.next(), if !waits.is_empty() => Wake::Ready(id, ready),
                    () = tokio::time::sleep(self.poll_interval) => Wake::Tick,
                }
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Event(event) => self.on_event(event),
                Wake::Ready(id, Err(e)) => {
                    if let Some(conn) = self.conns.get_mut(&id) {
                        debug!(target: "bridge.server", conn = id, error = %e, "readiness wait failed");
                        conn.dead = true;
                    }
                }
                Wake::Ready(_, Ok(_)) | Wake::Tick => {}
            }
            while let Ok(event) = self.events.try_recv() {
                self.on_event(event);
            }

            let ctx = &self.ctx;
            for conn in self.conns.values_mut() {
                if !conn.dead {
                    service(conn, ctx).await;
                }
            }
        }

        let open = self.conns.len();
        self.conns.clear();
        self.ctx.stats.connections_closed(open);
        info!(target: "bridge.server", dropped = open, "i/o loop stopped");
    }

    fn on_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Accepted(stream) => {
                let id = self.next_id;
                self.next_id += 1;
                let conn = Connection::new(id, stream);
                debug!(target: "bridge.server", conn = id, peer = %conn.peer, "connection accepted");
                self.ctx.stats.connection_opened();
                self.conns.insert(id, conn);
            }
            LoopEvent::Completed { conn, outcome } => {
                let Some(c) = self.conns.get_mut(&conn) else {
                    debug!(target: "bridge.server", conn, "dropping reply for closed connection");
                    return;
                };
                c.processing = false;
                match outcome {
                    Ok(Some(frame)) => c.send.append(frame.as_slice()),
                    Ok(None) => {}
                    Err(e) => fail(c, &self.ctx, &e),
                }
            }
        }
    }

    fn reap(&mut self) {
        let before = self.conns.len();
        self.conns.retain(|id, c| {
            if c.dead {
                debug!(target: "bridge.server", conn = *id, peer = %c.peer, "connection closed");
            }
            !c.dead
        });
        let reaped = before - self.conns.len();
        if reaped > 0 {
            self.ctx.stats.connections_closed(reaped);
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection servicing
// ---------------------------------------------------------------------------

async fn service(conn: &mut Connection, ctx: &Context) {
    flush(conn);
    receive(conn);

    while !conn.processing && !conn.dead {
        match decode_frame(&mut conn.recv, ctx.max_frame_bytes) {
            Ok(FrameDecode::Incomplete) => break,
            Ok(FrameDecode::Frame(envelope)) => dispatch_frame(conn, ctx, envelope).await,
            Err(e) => fail(conn, ctx, &e),
        }
    }

    flush(conn);
    // Frames that arrived before the close have been dispatched and their
    // replies given one send attempt.
    if conn.peer_closed && !conn.dead {
        debug!(target: "bridge.server", conn = conn.id, "peer closed connection");
        conn.dead = true;
    }
}

fn flush(conn: &mut Connection) {
    if conn.dead || conn.send.is_empty() {
        return;
    }
    match conn.send.send_once(&conn.stream) {
        Ok(sent) => {
            trace!(target: "bridge.server", conn = conn.id, bytes = sent, pending = conn.send.len(), "sent");
        }
        Err(e) => {
            debug!(target: "bridge.server", conn = conn.id, error = %e, "send failed");
            conn.dead = true;
        }
    }
}

fn receive(conn: &mut Connection) {
    for _ in 0..MAX_READS_PER_PASS {
        match conn.recv.try_receive(&conn.stream, READ_CHUNK) {
            Ok(Some(0)) => {
                conn.peer_closed = true;
                break;
            }
            Ok(Some(n)) => {
                trace!(target: "bridge.server", conn = conn.id, bytes = n, "received");
                if n < READ_CHUNK {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(target: "bridge.server", conn = conn.id, error = %e, "receive failed");
                conn.dead = true;
                break;
            }
        }
    }
}

async fn dispatch_frame(conn: &mut Connection, ctx: &Context, envelope: Envelope) {
    let message_type = envelope.message_type();
    let Some(handler) = ctx.registry.get(message_type) else {
        warn!(
            target: "bridge.server",
            conn = conn.id,
            message_type = message_type.name(),
            "no handler registered; dropping connection"
        );
        ctx.stats.protocol_error();
        conn.dead = true;
        return;
    };

    if handler.is_long_running() {
        trace!(target: "bridge.server", conn = conn.id, message_type = message_type.name(), "offloading");
        conn.processing = true;
        let id = conn.id;
        let stats = Arc::clone(&ctx.stats);
        let events = ctx.events.clone();
        let max_frame_bytes = ctx.max_frame_bytes;
        tokio::spawn(async move {
            let reply = dispatch(handler.as_ref(), envelope, &stats).await;
            let outcome = encode_reply(reply, max_frame_bytes);
            // The loop may already be gone during shutdown.
            let _ = events.send(LoopEvent::Completed { conn: id, outcome });
        });
        return;
    }

    trace!(target: "bridge.server", conn = conn.id, message_type = message_type.name(), "handling inline");
    let Some(reply) = dispatch(handler.as_ref(), envelope, &ctx.stats).await else {
        return;
    };
    if let Err(e) = encode_frame_limited(&reply, &mut conn.send, ctx.max_frame_bytes) {
        fail(conn, ctx, &e);
    }
}

fn encode_reply(
    reply: Option<Envelope>,
    max_frame_bytes: usize,
) -> Result<Option<ByteBuffer>, ProtocolError> {
    let Some(reply) = reply else {
        return Ok(None);
    };
    let mut buf = ByteBuffer::new();
    encode_frame_limited(&reply, &mut buf, max_frame_bytes)?;
    Ok(Some(buf))
}

fn fail(conn: &mut Connection, ctx: &Context, error: &ProtocolError) {
    warn!(
        target: "bridge.server",
        conn = conn.id,
        peer = %conn.peer,
        error = %error,
        "protocol error; dropping connection"
    );
    ctx.stats.protocol_error();
    conn.dead = true;
}
