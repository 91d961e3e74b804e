// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request handlers, their registry, and the dispatch boundary that turns
//! failures into [`ErrorInfo`] responses.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::{Envelope, ErrorInfo, MessageKind, MessageType, Request, Response};
use futures::FutureExt;
use tracing::{debug, warn};

use crate::{ServerError, ServerStats};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Typed handler for one request type.
///
/// Return `Ok(Some(response))` to reply, `Ok(None)` for no reply (the
/// normal outcome for one-way requests), or `Err` to reply with a failed
/// response carrying the error chain.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Request type served.
    type Request: Request + Send;

    /// Long-running handlers run on their own task; others run on the I/O
    /// loop and must be quick.
    fn is_long_running(&self) -> bool {
        false
    }

    /// Serve one request.
    async fn handle(
        &self,
        request: Self::Request,
    ) -> anyhow::Result<Option<<Self::Request as Request>::Response>>;
}

/// Type-erased handler as stored in a [`HandlerRegistry`].
#[async_trait]
pub trait Handler: Send + Sync {
    /// Request type served.
    fn message_type(&self) -> MessageType;

    /// See [`RequestHandler::is_long_running`].
    fn is_long_running(&self) -> bool;

    /// Serve one request envelope.
    async fn handle(&self, request: Envelope) -> anyhow::Result<Option<Envelope>>;

    /// A response of the right type carrying `error`.
    fn failed_response(&self, error: ErrorInfo) -> Envelope;
}

/// A request envelope reached a handler for a different type.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Registry and envelope disagree.
    #[error("handler for {expected} received {actual}")]
    WrongRequest {
        /// Type the handler serves.
        expected: MessageType,
        /// Type that arrived.
        actual: MessageType,
    },
}

struct Typed<H>(H);

#[async_trait]
impl<H: RequestHandler> Handler for Typed<H> {
    fn message_type(&self) -> MessageType {
        <H::Request as bridge_protocol::Message>::MESSAGE_TYPE
    }

    fn is_long_running(&self) -> bool {
        self.0.is_long_running()
    }

    async fn handle(&self, request: Envelope) -> anyhow::Result<Option<Envelope>> {
        let request = H::Request::try_from(request).map_err(|other| HandlerError::WrongRequest {
            expected: self.message_type(),
            actual: other.message_type(),
        })?;
        Ok(self.0.handle(request).await?.map(Into::into))
    }

    fn failed_response(&self, error: ErrorInfo) -> Envelope {
        <H::Request as Request>::Response::failed(error).into()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Exactly one handler per request type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("message_types", &types)
            .finish()
    }
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler.
    pub fn register<H: RequestHandler>(&mut self, handler: H) -> Result<&mut Self, ServerError> {
        self.register_dyn(Arc::new(Typed(handler)))
    }

    /// Register an already-erased handler.
    pub fn register_dyn(&mut self, handler: Arc<dyn Handler>) -> Result<&mut Self, ServerError> {
        let message_type = handler.message_type();
        if message_type.kind() != MessageKind::Request {
            return Err(ServerError::NotARequest(message_type));
        }
        if self.handlers.contains_key(&message_type) {
            return Err(ServerError::DuplicateHandler(message_type));
        }
        self.handlers.insert(message_type, handler);
        Ok(self)
    }

    /// Handler for `message_type`, if registered.
    pub fn get(&self, message_type: MessageType) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&message_type).cloned()
    }

    /// `true` if `message_type` has a handler.
    pub fn contains(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Dispatch boundary
// ---------------------------------------------------------------------------

/// Run `handler` on `request`, converting errors and panics into a failed
/// response. One-way requests never produce a reply.
pub(crate) async fn dispatch(
    handler: &dyn Handler,
    request: Envelope,
    stats: &ServerStats,
) -> Option<Envelope> {
    let message_type = handler.message_type();
    stats.request_handled();

    let outcome = AssertUnwindSafe(handler.handle(request)).catch_unwind().await;
    let error = match outcome {
        Ok(Ok(reply)) => {
            if message_type.is_one_way() {
                return None;
            }
            if reply.is_none() {
                warn!(target: "bridge.server", message_type = message_type.name(), "handler produced no reply for a two-way request");
            }
            return reply;
        }
        Ok(Err(e)) => ErrorInfo::from_anyhow(&e),
        Err(panic) => ErrorInfo::from_panic(panic.as_ref()),
    }
    .with_source(message_type.name());

    stats.request_failed();
    if message_type.is_one_way() {
        warn!(target: "bridge.server", message_type = message_type.name(), error = %error, "one-way handler failed");
        return None;
    }
    debug!(target: "bridge.server", message_type = message_type.name(), error = %error, "handler failed");
    Some(handler.failed_response(error))
}
