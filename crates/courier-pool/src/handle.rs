//! Handles to pooled messages: [`Draft`] while it is being filled,
//! [`Sealed`] once it belongs to the delivery engine.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use courier_protocol::{Lifecycle, Message, Phase, ProtocolError, Receipt};

use crate::pool::TypePool;

/// A message checked out of the pool, owned exclusively by the caller.
///
/// The payload is reachable through `Deref`/`DerefMut`. Dropping a draft
/// without sealing it discards the instance (it was never sent, so it is
/// not eligible for recycling); the pool's lifetime counter still shows
/// it was built.
pub struct Draft<M: Message> {
    pub(crate) body: Box<M>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) home: Arc<TypePool<M>>,
}

impl<M: Message> Draft<M> {
    /// Read-only view of the lifecycle gates.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Hands the message over for delivery: `Fresh → Queued`, records the
    /// receipt, and freezes the payload behind an `Arc`.
    ///
    /// # Errors
    /// [`ProtocolError::IllegalTransition`] if the draft is not `Fresh`.
    pub fn seal(self, receipt: Receipt) -> Result<Arc<Sealed<M>>, ProtocolError> {
        self.lifecycle.transition(Phase::Fresh, Phase::Queued)?;
        self.lifecycle.set_receipt(receipt);
        let Draft {
            body,
            lifecycle,
            home,
        } = self;
        Ok(Arc::new(Sealed {
            body,
            lifecycle,
            home,
        }))
    }
}

impl<M: Message> Deref for Draft<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.body
    }
}

impl<M: Message> DerefMut for Draft<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.body
    }
}

impl<M: Message + fmt::Debug> fmt::Debug for Draft<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Draft")
            .field("body", &self.body)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// A message that has been handed to delivery.
///
/// Shared (`Arc`) between the send task, the retry table, and the ack
/// handler. The payload is read-only from here on; only the lifecycle
/// gates keep moving.
pub struct Sealed<M: Message> {
    pub(crate) body: Box<M>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) home: Arc<TypePool<M>>,
}

impl<M: Message> Sealed<M> {
    /// The payload.
    pub fn message(&self) -> &M {
        &self.body
    }

    /// The lifecycle gates.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Gives up this holder's reference and recycles the message if this
    /// was the last one and delivery is complete.
    ///
    /// Safe to call from every place that lets go of the message; returns
    /// `true` only for the single call that put it back in the pool.
    pub fn release(this: Arc<Self>) -> bool {
        let home = Arc::clone(&this.home);
        home.reclaim(this)
    }
}

impl<M: Message + fmt::Debug> fmt::Debug for Sealed<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sealed")
            .field("body", &self.body)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
