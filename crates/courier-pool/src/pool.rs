//! The message pool: one idle queue and one construction counter per
//! message type.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use courier_protocol::{Lifecycle, Message, MessageKind, Phase};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;

use crate::{Draft, PoolError, Sealed};

/// Observability snapshot for one message type.
///
/// `constructed` and `idle` are read one after the other, not under a
/// common lock, so they can be momentarily inconsistent with each other
/// (e.g. `idle` counting an instance released after `constructed` was
/// read). Treat them as monitoring numbers, not as an invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Rust type name of the message.
    pub message_type: &'static str,
    /// Wire kind of the message.
    pub kind: MessageKind,
    /// Instances ever built for this type. Never decreases.
    pub constructed: usize,
    /// Instances currently idle in the queue.
    pub idle: usize,
}

/// An idle instance waiting in a queue. Its lifecycle is always `Pooled`.
pub(crate) struct Idle<M> {
    body: Box<M>,
    lifecycle: Lifecycle,
}

/// Queue and counter for one concrete message type.
pub(crate) struct TypePool<M: Message> {
    idle: SegQueue<Idle<M>>,
    constructed: AtomicUsize,
}

impl<M: Message> TypePool<M> {
    fn new() -> Self {
        Self {
            idle: SegQueue::new(),
            constructed: AtomicUsize::new(0),
        }
    }

    fn checkout(self: &Arc<Self>) -> Result<Draft<M>, PoolError> {
        // No length pre-check: an empty pop is just a miss.
        while let Some(Idle { body, lifecycle }) = self.idle.pop() {
            if let Err(e) = lifecycle.transition(Phase::Pooled, Phase::Fresh) {
                tracing::warn!(
                    message_type = std::any::type_name::<M>(),
                    error = %e,
                    "discarding idle message in unexpected state"
                );
                continue;
            }
            lifecycle.clear_receipt();
            return Ok(Draft {
                body,
                lifecycle,
                home: Arc::clone(self),
            });
        }
        self.construct()
    }

    fn construct(self: &Arc<Self>) -> Result<Draft<M>, PoolError> {
        let body = M::create().map_err(|source| PoolError::Construction {
            type_name: std::any::type_name::<M>(),
            source,
        })?;
        let total = self.constructed.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            message_type = std::any::type_name::<M>(),
            kind = %M::KIND,
            total,
            "constructed new pooled message"
        );
        Ok(Draft {
            body: Box::new(body),
            lifecycle: Lifecycle::new(),
            home: Arc::clone(self),
        })
    }

    /// Drops one holder's reference; recycles if it was the last and
    /// every gate is clear.
    pub(crate) fn reclaim(&self, message: Arc<Sealed<M>>) -> bool {
        // `into_inner` hands the value to exactly one of any number of
        // concurrent callers: the one dropping the final reference.
        let Some(sealed) = Arc::into_inner(message) else {
            tracing::trace!(
                message_type = std::any::type_name::<M>(),
                "release deferred: message still shared"
            );
            return false;
        };

        if let Some(gate) = busy_gate(&sealed.lifecycle) {
            // Last holder let go mid-flight; nobody can finish it now.
            tracing::debug!(
                message_type = std::any::type_name::<M>(),
                gate,
                "last reference released before delivery finished; discarding"
            );
            return false;
        }

        let Sealed {
            mut body,
            lifecycle,
            ..
        } = sealed;
        if lifecycle.transition(Phase::Complete, Phase::Pooled).is_err() {
            return false;
        }
        body.clear();
        self.idle.push(Idle { body, lifecycle });
        tracing::trace!(
            message_type = std::any::type_name::<M>(),
            "message returned to pool"
        );
        true
    }
}

/// The first gate that keeps a message out of the pool, if any.
fn busy_gate(lifecycle: &Lifecycle) -> Option<&'static str> {
    if lifecycle.is_pooled() {
        Some("already pooled")
    } else if !lifecycle.is_sent() {
        Some("not sent")
    } else if lifecycle.is_buffered() {
        Some("buffered")
    } else if lifecycle.is_queued() {
        Some("queued")
    } else if lifecycle.is_sending() {
        Some("sending")
    } else {
        None
    }
}

/// Type-erased counters so `stats()` can walk every registered type.
trait PoolCounters: Send + Sync {
    fn message_type(&self) -> &'static str;
    fn kind(&self) -> MessageKind;
    fn constructed(&self) -> usize;
    fn idle(&self) -> usize;
}

impl<M: Message> PoolCounters for TypePool<M> {
    fn message_type(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn kind(&self) -> MessageKind {
        M::KIND
    }

    fn constructed(&self) -> usize {
        self.constructed.load(Ordering::Relaxed)
    }

    fn idle(&self) -> usize {
        self.idle.len()
    }
}

struct Registration {
    /// First-use order, so `stats()` is stable.
    order: usize,
    counters: Arc<dyn PoolCounters>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Per-type cache of reusable message instances.
///
/// Owned explicitly and shared by reference (or `Arc`) with whoever
/// needs to build messages, typically through the node's network
/// context. Queues are created lazily the first time a type is acquired
/// and live as long as the pool.
///
/// # Example
///
/// ```rust
/// use courier_pool::MessagePool;
/// use courier_protocol::{Message, MessageKind};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Default, Serialize, Deserialize)]
/// struct Ping {
///     nonce: u64,
/// }
///
/// impl Message for Ping {
///     const KIND: MessageKind = MessageKind(1);
/// }
///
/// let pool = MessagePool::new();
/// let mut ping = pool.acquire::<Ping>().unwrap();
/// ping.nonce = 7;
/// assert!(!ping.lifecycle().is_pooled());
/// assert_eq!(pool.constructed::<Ping>(), 1);
/// ```
pub struct MessagePool {
    pools: DashMap<TypeId, Registration>,
    next_order: AtomicUsize,
}

impl MessagePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            next_order: AtomicUsize::new(0),
        }
    }

    /// Returns a ready-to-fill message of type `M`.
    ///
    /// Reuses an idle instance when one can be popped, otherwise builds a
    /// new one. Never blocks waiting for an instance to come back.
    ///
    /// # Errors
    /// [`PoolError::Construction`] if `M::create()` fails.
    pub fn acquire<M: Message>(&self) -> Result<Draft<M>, PoolError> {
        self.pool_for::<M>()?.checkout()
    }

    /// Releases one reference to a sealed message. See [`Sealed::release`].
    pub fn release<M: Message>(&self, message: Arc<Sealed<M>>) -> bool {
        Sealed::release(message)
    }

    /// Per-type counters, in the order types were first used.
    ///
    /// Each type's two numbers are read independently; see [`PoolStats`].
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut rows: Vec<(usize, PoolStats)> = self
            .pools
            .iter()
            .map(|entry| {
                let c = &entry.counters;
                (
                    entry.order,
                    PoolStats {
                        message_type: c.message_type(),
                        kind: c.kind(),
                        constructed: c.constructed(),
                        idle: c.idle(),
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(order, _)| *order);
        rows.into_iter().map(|(_, stats)| stats).collect()
    }

    /// Instances of `M` ever built (0 if `M` was never acquired).
    pub fn constructed<M: Message>(&self) -> usize {
        self.pools
            .get(&TypeId::of::<M>())
            .map_or(0, |entry| entry.counters.constructed())
    }

    /// Instances of `M` currently idle (0 if `M` was never acquired).
    pub fn idle<M: Message>(&self) -> usize {
        self.pools
            .get(&TypeId::of::<M>())
            .map_or(0, |entry| entry.counters.idle())
    }

    fn pool_for<M: Message>(&self) -> Result<Arc<TypePool<M>>, PoolError> {
        let id = TypeId::of::<M>();
        // Read lock on one shard for the common case.
        let existing = self.pools.get(&id).map(|entry| Arc::clone(&entry.typed));
        let typed = match existing {
            Some(typed) => typed,
            None => {
                let entry = self.pools.entry(id).or_insert_with(|| {
                    let pool = Arc::new(TypePool::<M>::new());
                    tracing::debug!(
                        message_type = std::any::type_name::<M>(),
                        kind = %M::KIND,
                        "registered message pool"
                    );
                    Registration {
                        order: self.next_order.fetch_add(1, Ordering::Relaxed),
                        counters: Arc::clone(&pool) as Arc<dyn PoolCounters>,
                        typed: pool,
                    }
                });
                Arc::clone(&entry.typed)
            }
        };
        typed
            .downcast::<TypePool<M>>()
            .map_err(|_| PoolError::Registry(std::any::type_name::<M>()))
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}
