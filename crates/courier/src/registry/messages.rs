//! Registry wire messages.

use std::net::SocketAddr;

use courier_protocol::{Message, MessageKind};
use serde::{Deserialize, Serialize};

/// Asks a registry node for the registered servers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetServerRegistry;

impl Message for GetServerRegistry {
    const KIND: MessageKind = MessageKind(100);
}

/// One registered server as it appears in a registry reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub address: String,
    pub port: u16,
}

impl From<SocketAddr> for RegistryEntry {
    fn from(addr: SocketAddr) -> Self {
        Self {
            address: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

/// The registry's answer: registered servers in repository order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRegistry {
    pub entries: Vec<RegistryEntry>,
}

impl Message for ServerRegistry {
    const KIND: MessageKind = MessageKind(101);

    // Keep the allocation, drop the previous reply's servers.
    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Announces the sender as a game server listening on `port`.
///
/// The registry takes the IP from the datagram's source address, so a
/// server can't register on someone else's behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterServer {
    pub port: u16,
}

impl Message for RegisterServer {
    const KIND: MessageKind = MessageKind(102);
}
