//! End-to-end registry tests over loopback UDP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use courier::prelude::*;
use courier::registry::{
    GetServerRegistry, GetServerRegistryInterpreter, InMemoryMembers, RegisterServer,
    RegisterServerInterpreter, RegistryEntry, ServerRegistry, ServerRegistryListener,
};
use courier_protocol::{Frame, decode_datagram, encode_datagram};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};

type Context = NodeContext<InMemoryMembers, JsonCodec>;

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Helpers
// =========================================================================

async fn registry_node(members: InMemoryMembers) -> (SocketAddr, Arc<Context>) {
    let mut node = CourierNode::builder()
        .bind("127.0.0.1:0")
        .build(members)
        .await
        .expect("bind registry");
    node.register(GetServerRegistryInterpreter);
    node.register(RegisterServerInterpreter);
    start(node)
}

async fn client_node() -> (SocketAddr, Arc<Context>, mpsc::UnboundedReceiver<Vec<RegistryEntry>>) {
    let (listener, replies) = ServerRegistryListener::new();
    let mut node = CourierNode::builder()
        .bind("127.0.0.1:0")
        .build(InMemoryMembers::new())
        .await
        .expect("bind client");
    node.register(listener);
    let (addr, ctx) = start(node);
    (addr, ctx, replies)
}

fn start(node: CourierNode<InMemoryMembers, JsonCodec>) -> (SocketAddr, Arc<Context>) {
    let addr = node.local_addr().unwrap();
    let ctx = Arc::clone(node.context());
    tokio::spawn(node.run());
    (addr, ctx)
}

fn send<M: Message>(ctx: &Context, to: SocketAddr, fill: impl FnOnce(&mut M)) -> Receipt {
    let mut draft = ctx.pool().acquire::<M>().unwrap();
    fill(&mut *draft);
    ctx.delivery().send_reliable(draft, to, 0)
}

/// Polls `check` until it holds or the wait runs out.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Sends a registry query from a bare socket, the way a client with its
/// own receipt counter would. Returns the reply's receipt and entries.
async fn raw_query(
    socket: &UdpSocket,
    registry: SocketAddr,
    session: SessionId,
    receipt: Receipt,
) -> (Receipt, Vec<RegistryEntry>) {
    let query = Frame::Reliable {
        session,
        receipt,
        kind: GetServerRegistry::KIND,
    };
    let bytes = encode_datagram(&JsonCodec, &query, b"null").unwrap();
    socket.send_to(&bytes, registry).await.unwrap();

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (len, _) = tokio::time::timeout(WAIT, socket.recv_from(&mut buf))
            .await
            .expect("registry reply")
            .unwrap();
        let (frame, payload) = decode_datagram(&JsonCodec, &buf[..len]).unwrap();
        if let Frame::Reliable { receipt, kind, .. } = frame {
            if kind == ServerRegistry::KIND {
                let ack = encode_datagram(&JsonCodec, &Frame::Ack { receipt }, &[]).unwrap();
                socket.send_to(&ack, registry).await.unwrap();
                let reply: ServerRegistry = JsonCodec.decode(payload).unwrap();
                return (receipt, reply.entries);
            }
        }
    }
}

fn server(addr: [u8; 4], port: u16) -> Member {
    Member {
        addr: SocketAddr::from((addr, port)),
        is_registered_server: true,
    }
}

fn player(addr: [u8; 4], port: u16) -> Member {
    Member {
        addr: SocketAddr::from((addr, port)),
        is_registered_server: false,
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_query_returns_registered_servers_in_order() {
    let (registry, _) = registry_node(InMemoryMembers::with_members([
        server([10, 0, 0, 2], 2000),
        player([10, 0, 0, 9], 9000),
        server([10, 0, 0, 1], 1000),
    ]))
    .await;
    let (_, client, mut replies) = client_node().await;

    send::<GetServerRegistry>(&client, registry, |_| {});

    let entries = tokio::time::timeout(WAIT, replies.recv())
        .await
        .expect("registry reply")
        .expect("listener open");
    assert_eq!(
        entries,
        vec![
            RegistryEntry {
                address: "10.0.0.2".into(),
                port: 2000
            },
            RegistryEntry {
                address: "10.0.0.1".into(),
                port: 1000
            },
        ]
    );
}

#[tokio::test]
async fn test_empty_registry_still_replies() {
    let (registry, _) = registry_node(InMemoryMembers::new()).await;
    let (_, client, mut replies) = client_node().await;

    send::<GetServerRegistry>(&client, registry, |_| {});

    let entries = tokio::time::timeout(WAIT, replies.recv())
        .await
        .expect("registry reply")
        .expect("listener open");
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_registered_server_shows_up_in_query() {
    let (registry, registry_ctx) = registry_node(InMemoryMembers::new()).await;
    let (game_server, game_ctx, _) = client_node().await;
    let (_, client, mut replies) = client_node().await;

    send::<RegisterServer>(&game_ctx, registry, |m| m.port = 7777);
    assert!(
        eventually(|| {
            registry_ctx
                .members()
                .members()
                .map(|m| m.iter().any(|m| m.is_registered_server))
                .unwrap_or(false)
        })
        .await
    );

    send::<GetServerRegistry>(&client, registry, |_| {});
    let entries = tokio::time::timeout(WAIT, replies.recv())
        .await
        .expect("registry reply")
        .expect("listener open");
    assert_eq!(
        entries,
        vec![RegistryEntry {
            address: game_server.ip().to_string(),
            port: 7777
        }]
    );
}

#[tokio::test]
async fn test_acknowledged_messages_return_to_pools() {
    let (registry, registry_ctx) = registry_node(InMemoryMembers::new()).await;
    let (_, client, mut replies) = client_node().await;
    let mut completions = client.delivery().completions();

    let receipt = send::<GetServerRegistry>(&client, registry, |_| {});

    let done = tokio::time::timeout(WAIT, completions.recv())
        .await
        .expect("completion")
        .unwrap();
    assert_eq!(done.receipt, receipt);
    assert_eq!(done.outcome, DeliveryOutcome::Acknowledged);
    tokio::time::timeout(WAIT, replies.recv()).await.unwrap();

    // Query recycled on the client, reply recycled on the registry.
    assert!(eventually(|| client.pool().idle::<GetServerRegistry>() == 1).await);
    assert!(eventually(|| registry_ctx.pool().idle::<ServerRegistry>() == 1).await);

    // The next query reuses the recycled instance.
    send::<GetServerRegistry>(&client, registry, |_| {});
    assert_eq!(client.pool().constructed::<GetServerRegistry>(), 1);
}

#[tokio::test]
async fn test_unknown_kind_is_acked_and_ignored() {
    let (registry, registry_ctx) = registry_node(InMemoryMembers::new()).await;
    let (_, client, _) = client_node().await;
    let mut completions = client.delivery().completions();

    // The registry has no interpreter for replies.
    send::<ServerRegistry>(&client, registry, |m| {
        m.entries.push(RegistryEntry {
            address: "10.0.0.1".into(),
            port: 1,
        })
    });

    let done = tokio::time::timeout(WAIT, completions.recv())
        .await
        .expect("completion")
        .unwrap();
    assert_eq!(done.outcome, DeliveryOutcome::Acknowledged);
    assert!(registry_ctx.members().members().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_peer_exhausts_and_recycles() {
    // Bind and drop a socket so the port is (almost certainly) closed.
    let dead = {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap()
    };

    let mut node = CourierNode::builder()
        .bind("127.0.0.1:0")
        .delivery_config(DeliveryConfig {
            resend_interval: Duration::from_millis(10),
            default_ttl: 3,
            resend_jitter: Duration::ZERO,
            ..DeliveryConfig::default()
        })
        .build(InMemoryMembers::new())
        .await
        .unwrap();
    node.register(GetServerRegistryInterpreter);
    let (_, ctx) = start(node);
    let mut completions = ctx.delivery().completions();

    send::<GetServerRegistry>(&ctx, dead, |_| {});

    let done = tokio::time::timeout(WAIT, completions.recv())
        .await
        .expect("completion")
        .unwrap();
    // Depending on the OS the send either errors or silently goes nowhere.
    assert!(matches!(
        done.outcome,
        DeliveryOutcome::Exhausted | DeliveryOutcome::Unreachable
    ));
    assert!(eventually(|| ctx.pool().idle::<GetServerRegistry>() == 1).await);
}

#[tokio::test]
async fn test_restarted_client_on_same_port_gets_a_reply() {
    let (registry, _) = registry_node(InMemoryMembers::with_members([server(
        [10, 0, 0, 1],
        1000,
    )]))
    .await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let (first_reply, first) = raw_query(&socket, registry, SessionId(1), Receipt(1)).await;
    assert_eq!(first.len(), 1);
    drop(socket);

    // Same address, receipts starting over under a new session.
    let socket = UdpSocket::bind(addr).await.unwrap();
    let (second_reply, second) = raw_query(&socket, registry, SessionId(2), Receipt(1)).await;
    // A fresh reply, not a resend of the first one.
    assert_ne!(second_reply, first_reply);
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_large_registry_fits_one_reply() {
    let servers = (0..600u16).map(|i| server([10, 0, (i / 256) as u8, (i % 256) as u8], 1000 + i));
    let (registry, registry_ctx) = registry_node(InMemoryMembers::with_members(servers)).await;
    let (_, client, mut replies) = client_node().await;
    let mut registry_done = registry_ctx.delivery().completions();

    send::<GetServerRegistry>(&client, registry, |_| {});

    let entries = tokio::time::timeout(WAIT, replies.recv())
        .await
        .expect("registry reply")
        .expect("listener open");
    assert_eq!(entries.len(), 600);
    assert_eq!(
        entries[599],
        RegistryEntry {
            address: "10.0.2.87".into(),
            port: 1599
        }
    );

    let done = tokio::time::timeout(WAIT, registry_done.recv())
        .await
        .expect("reply completion")
        .unwrap();
    assert_eq!(done.outcome, DeliveryOutcome::Acknowledged);
}

#[tokio::test]
async fn test_run_until_stops_on_shutdown_signal() {
    let mut node = CourierNode::builder()
        .bind("127.0.0.1:0")
        .build(InMemoryMembers::new())
        .await
        .unwrap();
    node.register(GetServerRegistryInterpreter);
    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(node.run_until(async {
        let _ = stopped.await;
    }));

    stop.send(()).unwrap();
    let result = tokio::time::timeout(WAIT, running)
        .await
        .expect("node stops")
        .unwrap();
    assert!(result.is_ok());
}
