//! The member repository the registry reads from.

use std::net::SocketAddr;
use std::sync::RwLock;

/// Errors from a [`MemberRepository`].
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The backing store can't be read or written right now.
    #[error("member repository unavailable: {0}")]
    Unavailable(String),
}

/// A known peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub addr: SocketAddr,
    /// Whether this peer announced itself as a game server.
    pub is_registered_server: bool,
}

/// Ordered storage of known peers.
///
/// `members` returns a snapshot in insertion order; the registry reply
/// preserves that order.
pub trait MemberRepository: Send + Sync + 'static {
    /// All known members, in order.
    fn members(&self) -> Result<Vec<Member>, RepositoryError>;

    /// Marks `addr` as a registered server, adding it if unknown.
    fn register_server(&self, addr: SocketAddr) -> Result<(), RepositoryError>;
}

/// A [`MemberRepository`] held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMembers {
    members: RwLock<Vec<Member>>,
}

impl InMemoryMembers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the repository with `members`, in order.
    pub fn with_members(members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            members: RwLock::new(members.into_iter().collect()),
        }
    }

    /// Adds a plain (non-server) member. No-op if `addr` is already known.
    pub fn add_member(&self, addr: SocketAddr) -> Result<(), RepositoryError> {
        let mut members = self.members.write().map_err(poisoned)?;
        if !members.iter().any(|m| m.addr == addr) {
            members.push(Member {
                addr,
                is_registered_server: false,
            });
        }
        Ok(())
    }

    /// Forgets `addr`. Returns whether it was known.
    pub fn remove(&self, addr: SocketAddr) -> Result<bool, RepositoryError> {
        let mut members = self.members.write().map_err(poisoned)?;
        let before = members.len();
        members.retain(|m| m.addr != addr);
        Ok(members.len() != before)
    }
}

impl MemberRepository for InMemoryMembers {
    fn members(&self) -> Result<Vec<Member>, RepositoryError> {
        Ok(self.members.read().map_err(poisoned)?.clone())
    }

    fn register_server(&self, addr: SocketAddr) -> Result<(), RepositoryError> {
        let mut members = self.members.write().map_err(poisoned)?;
        match members.iter_mut().find(|m| m.addr == addr) {
            Some(member) => member.is_registered_server = true,
            None => members.push(Member {
                addr,
                is_registered_server: true,
            }),
        }
        tracing::info!(%addr, "server registered");
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("member lock poisoned".into())
}
