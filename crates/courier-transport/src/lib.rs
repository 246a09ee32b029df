//! Transport abstraction layer for Courier.
//!
//! Provides the [`Transport`] trait that abstracts over datagram
//! transports. Courier's reliability (acks, retries) lives above this
//! layer, so a transport only has to move opaque byte buffers between
//! socket addresses.
//!
//! # Feature Flags
//!
//! - `udp` (default): UDP transport via `tokio::net::UdpSocket`

mod error;
#[cfg(feature = "udp")]
mod udp;

pub use error::TransportError;
#[cfg(feature = "udp")]
pub use udp::UdpTransport;

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

/// The remote end of a datagram exchange.
///
/// A thin wrapper over [`SocketAddr`] so log lines and map keys read as
/// "peer" rather than "some address".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(SocketAddr);

impl PeerId {
    /// Creates a `PeerId` from a socket address.
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Returns the underlying socket address.
    pub fn addr(self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for PeerId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Sends and receives whole datagrams.
///
/// The returned futures are `Send` so the delivery engine and the node's
/// receive loop can run inside spawned Tokio tasks on any worker thread.
pub trait Transport: Send + Sync + 'static {
    /// Sends one datagram to `addr`.
    fn send_to(
        &self,
        data: &[u8],
        addr: SocketAddr,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next datagram and returns it with its source address.
    fn recv_from(
        &self,
    ) -> impl Future<Output = Result<(Vec<u8>, SocketAddr), TransportError>> + Send;

    /// Returns the local address this transport is bound to.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}
