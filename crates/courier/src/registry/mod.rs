//! The server registry protocol.
//!
//! A registry node keeps the list of known peers. Game servers announce
//! themselves with [`RegisterServer`]; clients ask for the current list
//! with [`GetServerRegistry`] and receive exactly one [`ServerRegistry`]
//! reply, in repository order, containing only registered servers.

mod interpreters;
mod messages;
mod repository;

pub use interpreters::{
    GetServerRegistryInterpreter, REGISTRY_REPLY_TTL, RegisterServerInterpreter,
    ServerRegistryListener,
};
pub use messages::{GetServerRegistry, RegisterServer, RegistryEntry, ServerRegistry};
pub use repository::{InMemoryMembers, Member, MemberRepository, RepositoryError};
