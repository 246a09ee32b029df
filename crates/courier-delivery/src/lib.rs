//! Reliable delivery for Courier.
//!
//! Defines the contract every reliable transport must honor
//! ([`ReliableDelivery`]) and ships the reference engine
//! ([`MessageBus`] + [`BusDriver`]) that implements it over any
//! [`Transport`](courier_transport::Transport).
//!
//! # The contract
//!
//! `send_reliable(message, destination, ttl)` takes ownership of a pooled
//! message and *always* drives it to
//! [`Phase::Complete`](courier_protocol::Phase::Complete): acknowledged,
//! out of retries, unreachable, or cancelled. Whatever the outcome, the
//! last holder releases the message so the pool gets it back.
//!
//! ```text
//! send_reliable ─→ outbox ─→ BusDriver ──send──→ Transport
//!                               │  ↑
//!                      pending ─┘  └─ resend ticker
//!                         ↑
//! receive loop ── ack ────┘ ─→ Complete ─→ release ─→ MessagePool
//! ```

mod bus;
mod config;
mod contract;

pub use bus::{BusDriver, Completion, DeliveryOutcome, MessageBus};
pub use config::DeliveryConfig;
pub use contract::{InFlight, ReliableDelivery};
