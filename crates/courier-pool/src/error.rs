//! Error types for the pool layer.

use courier_protocol::ProtocolError;

/// Errors returned by [`MessagePool::acquire`](crate::MessagePool::acquire).
///
/// An empty queue or a lost dequeue race is never an error: the pool
/// builds a fresh instance instead.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The message type's `create()` failed. The pool does not fall back
    /// to any other type.
    #[error("failed to construct {type_name}: {source}")]
    Construction {
        /// Rust type name of the message.
        type_name: &'static str,
        /// The error returned by `Message::create`.
        #[source]
        source: ProtocolError,
    },

    /// The registry entry for a type id holds some other pool type.
    #[error("pool registry entry for {0} holds a different message type")]
    Registry(&'static str),
}
