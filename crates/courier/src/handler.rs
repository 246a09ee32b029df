//! Per-datagram handling: acks, duplicate suppression, interpretation.
//!
//! The flow for each datagram is:
//!   1. Decode the frame header
//!   2. Ack → hand the receipt to the delivery engine
//!   3. Reliable → ack it, drop it if recently seen, else spawn a task
//!      that dispatches the payload to the registered interpreter

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use courier_protocol::{Codec, Frame, Receipt, SessionId, decode_datagram, encode_datagram};
use courier_transport::{PeerId, Transport};
use dashmap::DashMap;

use crate::registry::MemberRepository;
use crate::server::NodeState;
use crate::{CourierError, NetworkContext};

/// Handles one datagram from `from`.
pub(crate) async fn handle_datagram<R, C>(
    state: &Arc<NodeState<R, C>>,
    data: Vec<u8>,
    from: SocketAddr,
) where
    R: MemberRepository,
    C: Codec + Clone,
{
    let peer = PeerId::from(from);
    let (frame, payload) = match decode_datagram(&state.codec, &data) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(%peer, error = %e, "failed to decode frame");
            return;
        }
    };
    let payload_at = data.len() - payload.len();

    match frame {
        Frame::Ack { receipt } => {
            state.context.delivery().acknowledge(receipt);
        }
        Frame::Reliable {
            session,
            receipt,
            kind,
        } => {
            // Ack duplicates too: the first ack may have been lost.
            if let Err(e) = send_ack(state, receipt, from).await {
                tracing::debug!(%peer, %receipt, error = %e, "failed to ack");
            }
            if !state.seen.first_sight(peer, session, receipt) {
                tracing::trace!(%peer, %session, %receipt, "duplicate frame dropped");
                return;
            }

            let state = Arc::clone(state);
            tokio::spawn(async move {
                let payload = &data[payload_at..];
                if let Err(e) = state.dispatcher.dispatch(&state.context, from, kind, payload) {
                    tracing::debug!(%peer, %kind, error = %e, "interpretation failed");
                }
            });
        }
    }
}

async fn send_ack<R, C>(
    state: &NodeState<R, C>,
    receipt: Receipt,
    to: SocketAddr,
) -> Result<(), CourierError>
where
    R: MemberRepository,
    C: Codec,
{
    let bytes = encode_datagram(&state.codec, &Frame::Ack { receipt }, &[])?;
    state.transport.send_to(&bytes, to).await?;
    Ok(())
}

/// Remembers the last `capacity` receipts seen from each peer, for at
/// most `max_peers` peers.
///
/// Receipts only mean something within one sender session: a frame
/// carrying a new session from a known peer clears that peer's window.
/// When a new peer would exceed `max_peers`, the least recently heard
/// peer is forgotten.
pub(crate) struct DedupeWindow {
    capacity: usize,
    max_peers: usize,
    peers: DashMap<PeerId, Recent>,
    clock: AtomicU64,
}

struct Recent {
    session: SessionId,
    order: VecDeque<Receipt>,
    seen: HashSet<Receipt>,
    last_seen: u64,
}

impl Recent {
    fn new(session: SessionId, now: u64) -> Self {
        Self {
            session,
            order: VecDeque::new(),
            seen: HashSet::new(),
            last_seen: now,
        }
    }

    fn restart(&mut self, session: SessionId) {
        self.session = session;
        self.order.clear();
        self.seen.clear();
    }
}

impl DedupeWindow {
    pub(crate) fn new(capacity: usize, max_peers: usize) -> Self {
        Self {
            capacity,
            max_peers: max_peers.max(1),
            peers: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    /// Records `receipt` from `peer` in `session`; `false` if it was
    /// already in the window.
    pub(crate) fn first_sight(&self, peer: PeerId, session: SessionId, receipt: Receipt) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if !self.peers.contains_key(&peer) && self.peers.len() >= self.max_peers {
            self.forget_stalest();
        }

        let now = self.clock.fetch_add(1, Ordering::Relaxed);
        let mut recent = self
            .peers
            .entry(peer)
            .or_insert_with(|| Recent::new(session, now));
        recent.last_seen = now;
        if recent.session != session {
            tracing::debug!(%peer, old = %recent.session, new = %session, "peer restarted");
            recent.restart(session);
        }
        if recent.seen.contains(&receipt) {
            return false;
        }
        if recent.order.len() == self.capacity {
            if let Some(oldest) = recent.order.pop_front() {
                recent.seen.remove(&oldest);
            }
        }
        recent.order.push_back(receipt);
        recent.seen.insert(receipt);
        true
    }

    /// Number of peers currently tracked.
    #[cfg(test)]
    pub(crate) fn peers(&self) -> usize {
        self.peers.len()
    }

    fn forget_stalest(&self) {
        let stalest = self
            .peers
            .iter()
            .min_by_key(|recent| recent.last_seen)
            .map(|recent| *recent.key());
        if let Some(peer) = stalest {
            self.peers.remove(&peer);
            tracing::trace!(%peer, "dedupe window full, forgot peer");
        }
    }
}
