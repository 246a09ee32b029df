//! Routes decoded frames to the interpreter registered for their kind.

use std::collections::HashMap;
use std::net::SocketAddr;

use courier_protocol::{Codec, Message, MessageKind, ProtocolError};

use crate::{CourierError, Interpreter, NetworkContext};

type Handler<Ctx> = Box<dyn Fn(&Ctx, SocketAddr, &[u8]) -> Result<(), CourierError> + Send + Sync>;

/// Maps message kinds to interpreters.
///
/// Each registration captures the codec, so dispatch decodes the payload
/// into the interpreter's concrete message type before calling it.
pub struct Dispatcher<Ctx: NetworkContext, C: Codec> {
    codec: C,
    handlers: HashMap<MessageKind, Handler<Ctx>>,
}

impl<Ctx: NetworkContext, C: Codec + Clone> Dispatcher<Ctx, C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            handlers: HashMap::new(),
        }
    }

    /// Registers `interpreter` for its message kind, replacing any
    /// interpreter already registered for that kind.
    pub fn register<I: Interpreter<Ctx>>(&mut self, interpreter: I) {
        let kind = <I::Message as Message>::KIND;
        let codec = self.codec.clone();
        let handler: Handler<Ctx> = Box::new(move |ctx, sender, payload| {
            let message: I::Message = codec.decode(payload)?;
            interpreter.interpret(ctx, sender, &message)
        });
        if self.handlers.insert(kind, handler).is_some() {
            tracing::warn!(%kind, "replaced existing interpreter");
        } else {
            tracing::debug!(
                %kind,
                message_type = std::any::type_name::<I::Message>(),
                "interpreter registered"
            );
        }
    }

    /// Whether an interpreter is registered for `kind`.
    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Decodes `payload` and runs the interpreter registered for `kind`.
    ///
    /// # Errors
    /// - `CourierError::Protocol(InvalidMessage)` when nothing handles `kind`.
    /// - `CourierError::Protocol(Decode)` when the payload doesn't decode.
    /// - Whatever the interpreter returns.
    pub fn dispatch(
        &self,
        ctx: &Ctx,
        sender: SocketAddr,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), CourierError> {
        let handler = self.handlers.get(&kind).ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("no interpreter for message kind {kind}"))
        })?;
        handler(ctx, sender, payload)
    }
}
