//! Error types for the protocol layer.
//!
//! Each crate in Courier defines its own error enum. A `ProtocolError`
//! always means something went wrong turning messages into bytes (or
//! back), building a message, or moving a message through its lifecycle.

use crate::{MessageKind, Phase};

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing fields, a payload tagged
    /// with one kind but carrying another.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame or payload is well-formed but breaks protocol rules,
    /// e.g. a kind no interpreter is registered for.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The encoded datagram doesn't fit in a single UDP packet.
    #[error("datagram of {len} bytes exceeds the {max}-byte limit")]
    Oversized {
        /// Size the datagram would have had.
        len: usize,
        /// The limit it exceeded.
        max: usize,
    },

    /// A message type refused to construct a new instance.
    #[error("cannot construct {kind}: {reason}")]
    Construction {
        /// Kind of the message that failed to construct.
        kind: MessageKind,
        /// Why construction failed.
        reason: String,
    },

    /// A lifecycle transition that the state machine does not allow.
    #[error("illegal lifecycle transition {from:?} -> {to:?} (current {actual:?})")]
    IllegalTransition {
        /// Phase the caller expected the message to be in.
        from: Phase,
        /// Phase the caller tried to move to.
        to: Phase,
        /// Phase the message was actually in.
        actual: Phase,
    },
}
