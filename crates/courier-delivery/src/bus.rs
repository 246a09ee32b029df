//! The reference reliable-delivery engine.
//!
//! [`MessageBus`] is the cheap, cloneable front end that producers and
//! the receive loop talk to. [`BusDriver`] is the single task that owns
//! the transport side: it writes queued messages, keeps them in the
//! pending table until they are acknowledged, and resends on a ticker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use courier_pool::Draft;
use courier_protocol::{
    Codec, Frame, Message, MessageKind, Phase, ProtocolError, Receipt, SessionId, encode_datagram,
};
use courier_transport::Transport;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

use crate::{DeliveryConfig, InFlight, ReliableDelivery};

// ---------------------------------------------------------------------------
// Completion events
// ---------------------------------------------------------------------------

/// How a reliable send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The peer acknowledged the receipt.
    Acknowledged,
    /// Every transmission in the budget went unanswered.
    Exhausted,
    /// The transport refused to send to the destination.
    Unreachable,
    /// The payload could not be serialized.
    EncodeFailed,
    /// The encoded datagram is larger than one UDP packet can carry.
    Oversized,
    /// The engine shut down before delivery finished.
    Cancelled,
}

/// Published once per message when it reaches `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub receipt: Receipt,
    pub kind: MessageKind,
    pub destination: SocketAddr,
    /// Transmissions performed (0 if it never left the queue).
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// A message handed to the engine, waiting for the driver.
struct Outgoing<C: Codec> {
    message: Arc<dyn InFlight<C>>,
    receipt: Receipt,
    destination: SocketAddr,
    budget: u32,
}

/// A message that has been sent and awaits its ack.
struct PendingEntry<C: Codec> {
    message: Arc<dyn InFlight<C>>,
    destination: SocketAddr,
    budget: u32,
    attempts: u32,
    next_resend: Instant,
}

/// State reachable from both the bus handles and the driver.
struct BusShared<C: Codec> {
    pending: DashMap<Receipt, PendingEntry<C>>,
    completions: broadcast::Sender<Completion>,
}

impl<C: Codec> BusShared<C> {
    /// Terminal path: finish the lifecycle, announce it, let go.
    fn complete(
        &self,
        message: Arc<dyn InFlight<C>>,
        receipt: Receipt,
        destination: SocketAddr,
        attempts: u32,
        outcome: DeliveryOutcome,
    ) {
        if !message.lifecycle().finish() {
            // Someone else already finished it; just drop our reference.
            message.release();
            return;
        }
        tracing::debug!(
            %receipt,
            %destination,
            kind = %message.kind(),
            attempts,
            ?outcome,
            "reliable delivery finished"
        );
        // No subscribers is fine.
        let _ = self.completions.send(Completion {
            receipt,
            kind: message.kind(),
            destination,
            attempts,
            outcome,
        });
        message.release();
    }
}

// ---------------------------------------------------------------------------
// MessageBus
// ---------------------------------------------------------------------------

/// Front end of the delivery engine.
///
/// Cloning is cheap; every clone feeds the same driver.
pub struct MessageBus<C: Codec> {
    shared: Arc<BusShared<C>>,
    outbox: mpsc::UnboundedSender<Outgoing<C>>,
    next_receipt: Arc<AtomicU64>,
    session: SessionId,
    config: Arc<DeliveryConfig>,
}

impl<C: Codec> Clone for MessageBus<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            outbox: self.outbox.clone(),
            next_receipt: Arc::clone(&self.next_receipt),
            session: self.session,
            config: Arc::clone(&self.config),
        }
    }
}

impl<C: Codec> MessageBus<C> {
    /// Creates a bus and the driver that must be spawned to run it.
    ///
    /// Nothing is transmitted until [`BusDriver::run`] is polled.
    pub fn new<T: Transport>(
        transport: Arc<T>,
        codec: C,
        config: DeliveryConfig,
    ) -> (Self, BusDriver<T, C>) {
        let config = Arc::new(config.validated());
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (completions, _) = broadcast::channel(config.completion_capacity);
        let shared = Arc::new(BusShared {
            pending: DashMap::new(),
            completions,
        });

        // Receipts restart at 1 for every engine; the session tells
        // receivers this is a new run.
        let session = SessionId(rand::random());
        let bus = Self {
            shared: Arc::clone(&shared),
            outbox: outbox_tx,
            next_receipt: Arc::new(AtomicU64::new(1)),
            session,
            config: Arc::clone(&config),
        };
        let driver = BusDriver {
            shared,
            session,
            outbox: outbox_rx,
            transport,
            codec,
            config,
        };
        (bus, driver)
    }

    /// Handles an ack from the peer. Returns `false` for unknown or
    /// already-finished receipts (duplicate acks are normal).
    pub fn acknowledge(&self, receipt: Receipt) -> bool {
        match self.shared.pending.remove(&receipt) {
            Some((_, entry)) => {
                self.shared.complete(
                    entry.message,
                    receipt,
                    entry.destination,
                    entry.attempts,
                    DeliveryOutcome::Acknowledged,
                );
                true
            }
            None => {
                tracing::trace!(%receipt, "ack for unknown receipt");
                false
            }
        }
    }

    /// Number of messages sent and awaiting acknowledgment.
    pub fn pending(&self) -> usize {
        self.shared.pending.len()
    }

    /// Subscribes to completion events from now on.
    pub fn completions(&self) -> broadcast::Receiver<Completion> {
        self.shared.completions.subscribe()
    }

    /// The session id stamped on every frame this engine sends.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The engine's configuration (after validation).
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }
}

impl<C: Codec> ReliableDelivery for MessageBus<C> {
    fn send_reliable<M: Message>(
        &self,
        message: Draft<M>,
        destination: SocketAddr,
        ttl: u32,
    ) -> Receipt {
        let receipt = Receipt(self.next_receipt.fetch_add(1, Ordering::Relaxed));
        let budget = self.config.budget_for(ttl);

        let sealed = match message.seal(receipt) {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::warn!(%receipt, error = %e, "cannot queue message");
                return receipt;
            }
        };
        tracing::debug!(
            %receipt,
            %destination,
            kind = %M::KIND,
            budget,
            "queued for reliable delivery"
        );

        let outgoing = Outgoing {
            message: sealed as Arc<dyn InFlight<C>>,
            receipt,
            destination,
            budget,
        };
        if let Err(mpsc::error::SendError(outgoing)) = self.outbox.send(outgoing) {
            tracing::warn!(%receipt, "delivery engine stopped, cancelling send");
            self.shared.complete(
                outgoing.message,
                receipt,
                destination,
                0,
                DeliveryOutcome::Cancelled,
            );
        }
        receipt
    }
}

// ---------------------------------------------------------------------------
// BusDriver
// ---------------------------------------------------------------------------

/// The task that performs transmissions and retries.
///
/// Runs until every [`MessageBus`] clone has been dropped; anything still
/// pending at that point completes as [`DeliveryOutcome::Cancelled`].
pub struct BusDriver<T: Transport, C: Codec> {
    shared: Arc<BusShared<C>>,
    session: SessionId,
    outbox: mpsc::UnboundedReceiver<Outgoing<C>>,
    transport: Arc<T>,
    codec: C,
    config: Arc<DeliveryConfig>,
}

impl<T: Transport, C: Codec> BusDriver<T, C> {
    /// Drives the engine. Spawn this on the runtime.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.resend_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval = ?self.config.resend_interval,
            default_ttl = self.config.default_ttl,
            "delivery engine running"
        );

        loop {
            tokio::select! {
                next = self.outbox.recv() => match next {
                    Some(outgoing) => self.transmit(outgoing).await,
                    None => break,
                },
                _ = ticker.tick() => self.resend_due().await,
            }
        }

        self.cancel_pending();
        tracing::info!("delivery engine stopped");
    }

    /// First transmission of a queued message.
    async fn transmit(&self, outgoing: Outgoing<C>) {
        let Outgoing {
            message,
            receipt,
            destination,
            budget,
        } = outgoing;

        if let Err(e) = message.lifecycle().transition(Phase::Queued, Phase::Sending) {
            tracing::debug!(%receipt, error = %e, "message left the queue before sending");
            message.release();
            return;
        }

        let bytes = match self.frame(message.as_ref(), receipt) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    %receipt,
                    message_type = message.message_type(),
                    error = %e,
                    "failed to encode message"
                );
                self.shared
                    .complete(message, receipt, destination, 0, encode_outcome(&e));
                return;
            }
        };

        // Record before sending so an ack can never outrun the entry.
        self.shared.pending.insert(
            receipt,
            PendingEntry {
                message: Arc::clone(&message),
                destination,
                budget,
                attempts: 1,
                next_resend: Instant::now() + self.resend_delay(),
            },
        );
        self.send_attempt(message, receipt, destination, &bytes).await;
    }

    /// Resends everything due, and gives up on entries out of budget.
    async fn resend_due(&self) {
        let now = Instant::now();
        let mut due = Vec::new();
        let mut exhausted = Vec::new();

        for mut entry in self.shared.pending.iter_mut() {
            if entry.next_resend > now {
                continue;
            }
            if entry.attempts >= entry.budget {
                exhausted.push(*entry.key());
                continue;
            }
            entry.attempts += 1;
            entry.next_resend = now + self.resend_delay();
            due.push((*entry.key(), Arc::clone(&entry.message), entry.destination));
        }

        for receipt in exhausted {
            if let Some((_, entry)) = self.shared.pending.remove(&receipt) {
                tracing::debug!(%receipt, attempts = entry.attempts, "retry budget exhausted");
                self.shared.complete(
                    entry.message,
                    receipt,
                    entry.destination,
                    entry.attempts,
                    DeliveryOutcome::Exhausted,
                );
            }
        }

        for (receipt, message, destination) in due {
            // Fails if the ack landed after we collected it.
            if message.lifecycle().transition(Phase::Buffered, Phase::Sending).is_err() {
                message.release();
                continue;
            }
            match self.frame(message.as_ref(), receipt) {
                Ok(bytes) => {
                    tracing::trace!(%receipt, %destination, "resending");
                    self.send_attempt(message, receipt, destination, &bytes).await;
                }
                Err(e) => {
                    tracing::warn!(%receipt, error = %e, "failed to re-encode message");
                    message.release();
                    self.fail_pending(receipt, encode_outcome(&e));
                }
            }
        }
    }

    /// Writes one transmission and settles the lifecycle afterwards.
    async fn send_attempt(
        &self,
        message: Arc<dyn InFlight<C>>,
        receipt: Receipt,
        destination: SocketAddr,
        bytes: &[u8],
    ) {
        match self.transport.send_to(bytes, destination).await {
            Ok(()) => {
                // Fails only if the ack arrived while we were sending.
                let _ = message.lifecycle().transition(Phase::Sending, Phase::Buffered);
                message.release();
            }
            Err(e) => {
                tracing::warn!(%receipt, %destination, error = %e, "destination unreachable");
                message.release();
                self.fail_pending(receipt, DeliveryOutcome::Unreachable);
            }
        }
    }

    fn fail_pending(&self, receipt: Receipt, outcome: DeliveryOutcome) {
        if let Some((_, entry)) = self.shared.pending.remove(&receipt) {
            self.shared.complete(
                entry.message,
                receipt,
                entry.destination,
                entry.attempts,
                outcome,
            );
        }
    }

    fn cancel_pending(&self) {
        let receipts: Vec<Receipt> = self.shared.pending.iter().map(|e| *e.key()).collect();
        for receipt in receipts {
            self.fail_pending(receipt, DeliveryOutcome::Cancelled);
        }
    }

    fn frame(&self, message: &dyn InFlight<C>, receipt: Receipt) -> Result<Vec<u8>, ProtocolError> {
        let frame = Frame::Reliable {
            session: self.session,
            receipt,
            kind: message.kind(),
        };
        let payload = message.encode(&self.codec)?;
        encode_datagram(&self.codec, &frame, &payload)
    }

    fn resend_delay(&self) -> Duration {
        let jitter = self.config.resend_jitter;
        if jitter.is_zero() {
            return self.config.resend_interval;
        }
        let extra = rand::rng().random_range(0..=jitter.as_micros() as u64);
        self.config.resend_interval + Duration::from_micros(extra)
    }
}

fn encode_outcome(error: &ProtocolError) -> DeliveryOutcome {
    match error {
        ProtocolError::Oversized { .. } => DeliveryOutcome::Oversized,
        _ => DeliveryOutcome::EncodeFailed,
    }
}
