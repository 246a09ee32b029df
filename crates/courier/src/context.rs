//! What an interpreter can see of the node it runs on.

use courier_delivery::{MessageBus, ReliableDelivery};
use courier_pool::MessagePool;
use courier_protocol::Codec;

use crate::registry::MemberRepository;

/// The collaborators handed to every [`Interpreter`](crate::Interpreter).
///
/// Kept as a trait so interpreters can be tested against a fake delivery
/// engine and an in-memory repository without a socket.
pub trait NetworkContext: Send + Sync + 'static {
    type Members: MemberRepository;
    type Delivery: ReliableDelivery;

    /// The ordered member repository.
    fn members(&self) -> &Self::Members;

    /// Where outbound messages go.
    fn delivery(&self) -> &Self::Delivery;

    /// Where outbound messages come from.
    fn pool(&self) -> &MessagePool;
}

/// The context a [`CourierNode`](crate::CourierNode) runs its
/// interpreters with.
pub struct NodeContext<R: MemberRepository, C: Codec> {
    members: R,
    delivery: MessageBus<C>,
    pool: MessagePool,
}

impl<R: MemberRepository, C: Codec> NodeContext<R, C> {
    pub fn new(members: R, delivery: MessageBus<C>, pool: MessagePool) -> Self {
        Self {
            members,
            delivery,
            pool,
        }
    }
}

impl<R: MemberRepository, C: Codec> NetworkContext for NodeContext<R, C> {
    type Members = R;
    type Delivery = MessageBus<C>;

    fn members(&self) -> &R {
        &self.members
    }

    fn delivery(&self) -> &MessageBus<C> {
        &self.delivery
    }

    fn pool(&self) -> &MessagePool {
        &self.pool
    }
}
