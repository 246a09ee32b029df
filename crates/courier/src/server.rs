//! `CourierNode` builder and receive loop.
//!
//! This is the entry point for running a Courier node. It ties together
//! all the layers: transport → delivery → dispatcher → interpreters.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use courier_delivery::{BusDriver, DeliveryConfig, MessageBus};
use courier_pool::MessagePool;
use courier_protocol::{Codec, JsonCodec};
use courier_transport::{Transport, TransportError, UdpTransport};

use crate::handler::{DedupeWindow, handle_datagram};
use crate::registry::MemberRepository;
use crate::{CourierError, Dispatcher, Interpreter, NodeContext};

/// Receipts remembered per sender for duplicate suppression.
pub const DEFAULT_DEDUPE_WINDOW: usize = 256;

/// Senders tracked at once for duplicate suppression.
pub const DEFAULT_DEDUPE_PEERS: usize = 4096;

/// First pause after a failed receive; doubles up to [`MAX_RECV_BACKOFF`].
const MIN_RECV_BACKOFF: Duration = Duration::from_millis(10);
const MAX_RECV_BACKOFF: Duration = Duration::from_secs(1);

/// Shared node state passed to each interpretation task.
pub(crate) struct NodeState<R: MemberRepository, C: Codec> {
    pub(crate) transport: Arc<UdpTransport>,
    pub(crate) context: Arc<NodeContext<R, C>>,
    pub(crate) dispatcher: Dispatcher<NodeContext<R, C>, C>,
    pub(crate) codec: C,
    pub(crate) seen: DedupeWindow,
}

/// Builder for configuring and starting a Courier node.
///
/// # Example
///
/// ```rust,ignore
/// use courier::prelude::*;
///
/// let node = CourierNode::builder()
///     .bind("0.0.0.0:15940")
///     .delivery_config(DeliveryConfig::default())
///     .build(members)
///     .await?;
/// ```
pub struct CourierNodeBuilder {
    bind_addr: String,
    delivery: DeliveryConfig,
    dedupe_window: usize,
    dedupe_peers: usize,
}

impl CourierNodeBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:15940".to_string(),
            delivery: DeliveryConfig::default(),
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
            dedupe_peers: DEFAULT_DEDUPE_PEERS,
        }
    }

    /// Sets the UDP address to bind to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the retry timing and budget of the delivery engine.
    pub fn delivery_config(mut self, config: DeliveryConfig) -> Self {
        self.delivery = config;
        self
    }

    /// Sets how many recent receipts are remembered per sender.
    /// `0` disables duplicate suppression.
    pub fn dedupe_window(mut self, receipts: usize) -> Self {
        self.dedupe_window = receipts;
        self
    }

    /// Sets how many senders are tracked at once. Beyond that, the
    /// sender heard from least recently is forgotten.
    pub fn dedupe_peers(mut self, peers: usize) -> Self {
        self.dedupe_peers = peers;
        self
    }

    /// Binds the socket and assembles the node around `members`.
    ///
    /// Uses `JsonCodec` and `UdpTransport`.
    pub async fn build<R: MemberRepository>(
        self,
        members: R,
    ) -> Result<CourierNode<R, JsonCodec>, CourierError> {
        let transport = Arc::new(UdpTransport::bind(&self.bind_addr).await?);
        let (bus, driver) = MessageBus::new(Arc::clone(&transport), JsonCodec, self.delivery);
        let context = Arc::new(NodeContext::new(members, bus, MessagePool::new()));

        Ok(CourierNode {
            transport,
            context,
            dispatcher: Dispatcher::new(JsonCodec),
            driver,
            codec: JsonCodec,
            dedupe_window: self.dedupe_window,
            dedupe_peers: self.dedupe_peers,
        })
    }
}

impl Default for CourierNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Courier node: one UDP socket, one delivery engine, a set of
/// interpreters.
///
/// Register interpreters, then call [`run()`](Self::run) or
/// [`run_until()`](Self::run_until).
pub struct CourierNode<R: MemberRepository, C: Codec> {
    transport: Arc<UdpTransport>,
    context: Arc<NodeContext<R, C>>,
    dispatcher: Dispatcher<NodeContext<R, C>, C>,
    driver: BusDriver<UdpTransport, C>,
    codec: C,
    dedupe_window: usize,
    dedupe_peers: usize,
}

impl CourierNode<crate::registry::InMemoryMembers, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> CourierNodeBuilder {
        CourierNodeBuilder::new()
    }
}

impl<R, C> CourierNode<R, C>
where
    R: MemberRepository,
    C: Codec + Clone,
{
    /// Adds an interpreter for its message kind.
    pub fn register<I: Interpreter<NodeContext<R, C>>>(&mut self, interpreter: I) {
        self.dispatcher.register(interpreter);
    }

    /// Returns the local address the node is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CourierError> {
        Ok(self.transport.local_addr()?)
    }

    /// The context interpreters run with. Clone the `Arc` to send
    /// messages from outside an interpreter.
    pub fn context(&self) -> &Arc<NodeContext<R, C>> {
        &self.context
    }

    /// Runs the delivery engine and the receive loop until the transport
    /// shuts down.
    ///
    /// Each reliable frame is acknowledged, checked against the sender's
    /// recent receipts, and interpreted on its own task.
    pub async fn run(self) -> Result<(), CourierError> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`run()`](Self::run), but also stops once `shutdown`
    /// resolves.
    ///
    /// Stopping drops the node's handles on the delivery engine; pending
    /// sends complete as cancelled once every other handle is gone.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), CourierError> {
        let CourierNode {
            transport,
            context,
            dispatcher,
            driver,
            codec,
            dedupe_window,
            dedupe_peers,
        } = self;

        tokio::spawn(driver.run());
        let state = Arc::new(NodeState {
            transport,
            context,
            dispatcher,
            codec,
            seen: DedupeWindow::new(dedupe_window, dedupe_peers),
        });
        tracing::info!(addr = ?state.transport.local_addr().ok(), "Courier node running");

        tokio::pin!(shutdown);
        let mut backoff = MIN_RECV_BACKOFF;
        loop {
            let received = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, node stopping");
                    return Ok(());
                }
                received = state.transport.recv_from() => received,
            };
            match received {
                Ok((data, from)) => {
                    backoff = MIN_RECV_BACKOFF;
                    handle_datagram(&state, data, from).await;
                }
                Err(TransportError::Shutdown) => {
                    tracing::info!("transport shut down, node stopping");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?backoff, "receive failed");
                    tokio::select! {
                        _ = &mut shutdown => {
                            tracing::info!("shutdown requested, node stopping");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = next_backoff(backoff);
                }
            }
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_RECV_BACKOFF)
}
