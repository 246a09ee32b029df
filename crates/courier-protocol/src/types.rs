//! Identity and wire types shared by every Courier layer.
//!
//! Everything in this module is serialized onto the wire, so field names
//! and tags are part of the protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Numeric tag identifying a concrete [`Message`](crate::Message) type.
///
/// The receiver looks at the kind in a [`Frame::Reliable`] to decide which
/// payload type to decode and which interpreter to run. Kinds must be
/// unique across every message type a node registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageKind(pub u16);

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K-{}", self.0)
    }
}

/// Correlates one reliable send with its acknowledgment.
///
/// Issued by the delivery engine when a message is queued, echoed back by
/// the receiver in a [`Frame::Ack`]. Receipts are never zero; zero is the
/// "no receipt" value inside a [`Lifecycle`](crate::Lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receipt(pub u64);

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rcpt-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Frame: what actually goes on the wire
// ---------------------------------------------------------------------------

/// Largest UDP payload over IPv4, and so the largest datagram Courier
/// will build.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// Identifies one run of a sender's delivery engine.
///
/// Receipts restart at 1 whenever a process starts, so a receiver only
/// treats a receipt as a duplicate if it also carries the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{:016x}", self.0)
    }
}

/// The header of a single datagram.
///
/// The message payload is not part of the header: a datagram is the
/// encoded header followed by the raw payload bytes (see
/// [`encode_datagram`](crate::encode_datagram)), so payloads are never
/// re-encoded by the codec.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "Ack", "receipt": 7 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// A message that must be acknowledged. Retransmissions reuse the
    /// same session and receipt, which lets the receiver drop duplicates.
    Reliable {
        session: SessionId,
        receipt: Receipt,
        kind: MessageKind,
    },

    /// "I got it." Stops retransmission of `receipt` on the sender.
    Ack { receipt: Receipt },
}
