//! # Courier
//!
//! Pooled protocol messages, delivered reliably over UDP.
//!
//! Protocol handlers implement [`Interpreter`] for one inbound message
//! type. When a handler needs to reply, it takes a message from the
//! node's [`MessagePool`], fills it, and hands it to
//! [`ReliableDelivery::send_reliable`]. The delivery engine retransmits
//! until the peer acknowledges (or the retry budget runs out) and then
//! returns the message to the pool.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier::prelude::*;
//! use courier::registry::{GetServerRegistryInterpreter, InMemoryMembers};
//!
//! # async fn run() -> Result<(), CourierError> {
//! let mut node = CourierNode::builder()
//!     .bind("0.0.0.0:15940")
//!     .build(InMemoryMembers::new())
//!     .await?;
//! node.register(GetServerRegistryInterpreter);
//! node.run().await
//! # }
//! ```

mod context;
mod dispatch;
mod error;
mod handler;
mod interpreter;
pub mod registry;
mod server;

pub use context::{NetworkContext, NodeContext};
pub use dispatch::Dispatcher;
pub use error::CourierError;
pub use interpreter::Interpreter;
pub use server::{CourierNode, CourierNodeBuilder};

/// Everything needed to write interpreters and run a node.
pub mod prelude {
    pub use crate::registry::{Member, MemberRepository, RepositoryError};
    pub use crate::{
        CourierError, CourierNode, CourierNodeBuilder, Dispatcher, Interpreter, NetworkContext,
        NodeContext,
    };
    pub use courier_delivery::{
        Completion, DeliveryConfig, DeliveryOutcome, MessageBus, ReliableDelivery,
    };
    pub use courier_pool::{Draft, MessagePool, PoolError, PoolStats};
    pub use courier_protocol::{
        Codec, JsonCodec, Message, MessageKind, Phase, ProtocolError, Receipt, SessionId,
    };
    pub use courier_transport::{PeerId, Transport, TransportError, UdpTransport};
}
