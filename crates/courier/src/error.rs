//! Unified error type for Courier.

use courier_pool::PoolError;
use courier_protocol::ProtocolError;
use courier_transport::TransportError;

use crate::registry::RepositoryError;

/// Top-level error that wraps all crate-specific errors.
///
/// Interpreters and the node return this single type; the `#[from]`
/// conversions let `?` lift sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// A transport-level error (bind, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown message kind).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The pool could not construct a message.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The member repository could not be read or updated.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
