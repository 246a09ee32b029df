//! Message pooling for Courier.
//!
//! Reliable messaging allocates a message for every send and keeps it
//! alive until the peer acknowledges it. This crate recycles those
//! allocations:
//!
//! 1. **Acquire**: [`MessagePool::acquire`] pops an idle instance of the
//!    requested type, or builds a new one when the queue is empty. It
//!    never waits.
//! 2. **Fill**: the caller owns the returned [`Draft`] exclusively and
//!    mutates the payload through `DerefMut`.
//! 3. **Seal**: [`Draft::seal`] hands the message to the delivery engine
//!    as a shared, read-only [`Sealed`].
//! 4. **Release**: every holder calls [`Sealed::release`] when it lets
//!    go. Only the last holder, and only once delivery is
//!    [`Complete`](courier_protocol::Phase::Complete), puts the instance
//!    back in the idle queue.
//!
//! # Concurrency
//!
//! Per-type queues are lock-free (`crossbeam::queue::SegQueue`) and the
//! type registry is a sharded `DashMap`, so producers, send tasks, and ack
//! handlers never serialize on one lock.

mod error;
mod handle;
mod pool;

pub use error::PoolError;
pub use handle::{Draft, Sealed};
pub use pool::{MessagePool, PoolStats};
