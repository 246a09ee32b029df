//! UDP transport implementation using `tokio::net::UdpSocket`.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::{Transport, TransportError};

/// Largest datagram we are prepared to receive.
const MAX_DATAGRAM: usize = 64 * 1024;

/// A UDP-based [`Transport`].
///
/// One socket serves both directions; `send_to` and `recv_from` take
/// `&self`, so the transport can be shared behind an `Arc` between the
/// delivery engine and the receive loop.
///
/// Receives land in one buffer allocated at bind time; only the bytes of
/// each datagram are copied out. Concurrent receivers take turns.
pub struct UdpTransport {
    socket: UdpSocket,
    recv_buf: Mutex<Box<[u8]>>,
}

impl UdpTransport {
    /// Binds a new UDP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "UDP transport bound");
        Ok(Self {
            socket,
            recv_buf: Mutex::new(vec![0u8; MAX_DATAGRAM].into_boxed_slice()),
        })
    }
}

impl Transport for UdpTransport {
    async fn send_to(
        &self,
        data: &[u8],
        addr: SocketAddr,
    ) -> Result<(), TransportError> {
        self.socket
            .send_to(data, addr)
            .await
            .map(|_| ())
            .map_err(|source| TransportError::SendFailed { addr, source })
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = self.recv_buf.lock().await;
        let (len, from) = self
            .socket
            .recv_from(&mut buf[..])
            .await
            .map_err(TransportError::ReceiveFailed)?;
        tracing::trace!(%from, len, "datagram received");
        Ok((buf[..len].to_vec(), from))
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::BindFailed)
    }
}
