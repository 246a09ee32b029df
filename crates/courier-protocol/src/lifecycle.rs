//! Message lifecycle: the gate state that decides when a message may be
//! recycled.
//!
//! Four independent actors touch a message while it is in use: the
//! producer that fills it, the send task that serializes it, the ack/retry
//! engine that may resend it, and the pool that wants it back. Each of
//! them moves the message through [`Phase`]s:
//!
//! ```text
//!            seal            transmit          sent
//!   Fresh ─────────→ Queued ─────────→ Sending ─────→ Buffered
//!     ↑                │                 │  ↑            │
//!     │                │                 │  └─resend─────┤
//!     │ acquire        └────cancel───────┴──fail───┐     │ ack / exhausted
//!     │                                            ▼     ▼
//!   Pooled ←────────────────release──────────────── Complete
//! ```
//!
//! The phase is stored in a single atomic, so the send task can move a
//! message to `Buffered` while the ack handler moves it to `Complete`
//! without tearing. Every transition is a compare-and-swap against the
//! phase the caller expects, which makes illegal sequences (resending a
//! completed message, recycling a buffered one) fail instead of corrupting
//! state.
//!
//! The five boolean gates of the classic design (`pooled`, `sent`,
//! `buffered`, `queued`, `sending`) are exposed as derived views.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::{ProtocolError, Receipt};

/// Where a message is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Just constructed or just handed out by the pool; payload is being
    /// filled by its exclusive owner.
    Fresh = 0,
    /// Handed to the delivery engine, waiting for the send task.
    Queued = 1,
    /// Being serialized and written to the transport.
    Sending = 2,
    /// Sent at least once, waiting for an acknowledgment or a resend.
    Buffered = 3,
    /// Delivery is over: acknowledged, out of retries, unreachable, or
    /// cancelled. The only phase the pool recycles from.
    Complete = 4,
    /// Idle in the pool.
    Pooled = 5,
}

impl Phase {
    /// Returns `true` if the state machine allows `self → next`.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Fresh, Queued)
                | (Queued, Sending)
                | (Queued, Complete)
                | (Sending, Buffered)
                | (Sending, Complete)
                | (Buffered, Sending)
                | (Buffered, Complete)
                | (Complete, Pooled)
                | (Pooled, Fresh)
        )
    }

    /// Returns `true` while the delivery engine owns the message.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Queued | Self::Sending | Self::Buffered)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Fresh,
            1 => Self::Queued,
            2 => Self::Sending,
            3 => Self::Buffered,
            4 => Self::Complete,
            _ => Self::Pooled,
        }
    }
}

/// Atomic lifecycle state plus the optional delivery receipt.
pub struct Lifecycle {
    phase: AtomicU8,
    /// 0 means "no receipt"; receipts issued by the bus start at 1.
    receipt: AtomicU64,
}

impl Lifecycle {
    /// A lifecycle in [`Phase::Fresh`] with no receipt.
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Fresh as u8),
            receipt: AtomicU64::new(0),
        }
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Idle in the pool.
    pub fn is_pooled(&self) -> bool {
        self.phase() == Phase::Pooled
    }

    /// Has been written to the transport at least once and has not been
    /// recycled since.
    pub fn is_sent(&self) -> bool {
        matches!(self.phase(), Phase::Buffered | Phase::Complete)
    }

    /// Waiting for an acknowledgment.
    pub fn is_buffered(&self) -> bool {
        self.phase() == Phase::Buffered
    }

    /// Waiting for the send task.
    pub fn is_queued(&self) -> bool {
        self.phase() == Phase::Queued
    }

    /// Being written to the transport right now.
    pub fn is_sending(&self) -> bool {
        self.phase() == Phase::Sending
    }

    /// Moves `from → to` if the message is currently in `from`.
    ///
    /// # Errors
    /// [`ProtocolError::IllegalTransition`] if the edge is not part of the
    /// state machine, or if another actor moved the message first.
    pub fn transition(&self, from: Phase, to: Phase) -> Result<(), ProtocolError> {
        if !from.can_transition_to(to) {
            return Err(ProtocolError::IllegalTransition {
                from,
                to,
                actual: self.phase(),
            });
        }
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| ProtocolError::IllegalTransition {
                from,
                to,
                actual: Phase::from_u8(actual),
            })
    }

    /// Ends delivery from whichever in-flight phase the message is in.
    ///
    /// Returns `true` if this call performed the move to
    /// [`Phase::Complete`]; `false` if the message was already complete
    /// (or was never in flight).
    pub fn finish(&self) -> bool {
        let mut current = self.phase.load(Ordering::Acquire);
        loop {
            if !Phase::from_u8(current).is_in_flight() {
                return false;
            }
            match self.phase.compare_exchange_weak(
                current,
                Phase::Complete as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// The receipt assigned by the delivery engine, if any.
    pub fn receipt(&self) -> Option<Receipt> {
        match self.receipt.load(Ordering::Acquire) {
            0 => None,
            raw => Some(Receipt(raw)),
        }
    }

    /// Records the receipt issued for this send.
    pub fn set_receipt(&self, receipt: Receipt) {
        self.receipt.store(receipt.0, Ordering::Release);
    }

    /// Forgets the receipt (done when the pool hands the message out).
    pub fn clear_receipt(&self) {
        self.receipt.store(0, Ordering::Release);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("phase", &self.phase())
            .field("receipt", &self.receipt())
            .finish()
    }
}
