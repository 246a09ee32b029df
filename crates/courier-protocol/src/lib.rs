//! Wire protocol and message lifecycle for Courier.
//!
//! This crate defines what a message *is* and how it travels:
//!
//! - **Messages** ([`Message`], [`MessageKind`]): the payload types that
//!   applications define, plus the kind tag used to route them.
//! - **Lifecycle** ([`Lifecycle`], [`Phase`]): the gate state every
//!   pooled message carries while it is filled, queued, sent, buffered
//!   for acknowledgment, and finally recycled.
//! - **Frames** ([`Frame`], [`Receipt`], [`SessionId`]): the header that
//!   goes on the wire for reliable delivery and acknowledgments.
//!   [`encode_datagram`] puts the message payload after it unchanged.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, bytes out.
//!
//! # Architecture
//!
//! ```text
//! Transport (datagrams) → Protocol (Frame) → Delivery (acks, retries)
//!                                          → Interpreters (Message)
//! ```

mod codec;
mod error;
mod lifecycle;
mod message;
mod types;

pub use codec::{Codec, decode_datagram, encode_datagram};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use lifecycle::{Lifecycle, Phase};
pub use message::Message;
pub use types::{Frame, MAX_DATAGRAM_LEN, MessageKind, Receipt, SessionId};
