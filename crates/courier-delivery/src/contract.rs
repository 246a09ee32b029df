//! The delivery contract consumed by interpreters, and the type-erased
//! in-flight view the engine works with.

use std::net::SocketAddr;
use std::sync::Arc;

use courier_pool::{Draft, Sealed};
use courier_protocol::{Codec, Lifecycle, Message, MessageKind, ProtocolError, Receipt};

/// Guaranteed-delivery send, as seen by code that produces messages.
///
/// Implementations must:
/// - move the message `Queued → Sending → Buffered → Complete`, in that
///   order, never back to `Sending` once complete;
/// - reach `Complete` on every outcome (ack, retry exhaustion,
///   unreachable destination, shutdown);
/// - release their reference to the message when they let go of it.
///
/// `ttl` is the retry budget: at most `ttl` transmissions. `0` selects the
/// implementation's default budget, which must still be finite.
pub trait ReliableDelivery: Send + Sync {
    /// Takes ownership of `message` and starts delivering it.
    ///
    /// Returns the receipt the peer will acknowledge.
    fn send_reliable<M: Message>(
        &self,
        message: Draft<M>,
        destination: SocketAddr,
        ttl: u32,
    ) -> Receipt;
}

/// A sealed message with its concrete type erased, so one pending table
/// can hold every message type.
///
/// Generic over the codec rather than over the message, which keeps the
/// trait object-safe while still encoding with the node's codec.
pub trait InFlight<C: Codec>: Send + Sync + 'static {
    /// Wire kind of the payload.
    fn kind(&self) -> MessageKind;

    /// Rust type name of the payload, for logs.
    fn message_type(&self) -> &'static str;

    /// The lifecycle gates.
    fn lifecycle(&self) -> &Lifecycle;

    /// Serializes the payload. Called on every (re)transmission.
    fn encode(&self, codec: &C) -> Result<Vec<u8>, ProtocolError>;

    /// Gives up one reference; see [`Sealed::release`].
    fn release(self: Arc<Self>) -> bool;
}

impl<M: Message, C: Codec> InFlight<C> for Sealed<M> {
    fn kind(&self) -> MessageKind {
        M::KIND
    }

    fn message_type(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn lifecycle(&self) -> &Lifecycle {
        Sealed::lifecycle(self)
    }

    fn encode(&self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        codec.encode(self.message())
    }

    fn release(self: Arc<Self>) -> bool {
        Sealed::release(self)
    }
}
