//! The protocol interpreter contract.

use std::net::SocketAddr;

use courier_protocol::Message;

use crate::{CourierError, NetworkContext};

/// Reacts to one inbound message type.
///
/// Interpreters are stateless: everything they need comes from the
/// context, the sender address, and the message. The node runs them
/// concurrently, one task per inbound message, so the same interpreter
/// may be executing for several senders at once.
///
/// # Example
///
/// ```rust,ignore
/// struct PingInterpreter;
///
/// impl<Ctx: NetworkContext> Interpreter<Ctx> for PingInterpreter {
///     type Message = Ping;
///
///     fn interpret(&self, ctx: &Ctx, sender: SocketAddr, ping: &Ping) -> Result<(), CourierError> {
///         let mut pong = ctx.pool().acquire::<Pong>()?;
///         pong.seq = ping.seq;
///         ctx.delivery().send_reliable(pong, sender, 0);
///         Ok(())
///     }
/// }
/// ```
pub trait Interpreter<Ctx: NetworkContext>: Send + Sync + 'static {
    /// The inbound message this interpreter handles.
    type Message: Message;

    /// Handles `message` from `sender`, sending zero or more replies.
    ///
    /// # Errors
    /// Whatever prevented a reply from being produced (typically
    /// [`CourierError::Pool`] when a message can't be constructed).
    fn interpret(
        &self,
        ctx: &Ctx,
        sender: SocketAddr,
        message: &Self::Message,
    ) -> Result<(), CourierError>;
}
