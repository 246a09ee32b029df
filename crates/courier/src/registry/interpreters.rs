//! Interpreters for the registry messages.

use std::net::SocketAddr;

use courier_delivery::ReliableDelivery;
use courier_protocol::ProtocolError;
use tokio::sync::mpsc;

use super::{
    GetServerRegistry, MemberRepository, RegisterServer, RegistryEntry, ServerRegistry,
};
use crate::{CourierError, Interpreter, NetworkContext};

/// Retry budget for registry replies: `0`, the delivery engine's default.
pub const REGISTRY_REPLY_TTL: u32 = 0;

/// Answers [`GetServerRegistry`] with the registered servers.
///
/// Always sends exactly one reply. If the repository can't be read the
/// reply is empty rather than missing, so the client isn't left waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetServerRegistryInterpreter;

impl<Ctx: NetworkContext> Interpreter<Ctx> for GetServerRegistryInterpreter {
    type Message = GetServerRegistry;

    fn interpret(
        &self,
        ctx: &Ctx,
        sender: SocketAddr,
        _: &GetServerRegistry,
    ) -> Result<(), CourierError> {
        let members = ctx.members().members().unwrap_or_else(|e| {
            tracing::warn!(%sender, error = %e, "registry unreadable, replying with no servers");
            Vec::new()
        });

        let mut reply = ctx.pool().acquire::<ServerRegistry>()?;
        reply.entries.extend(
            members
                .iter()
                .filter(|m| m.is_registered_server)
                .map(|m| RegistryEntry::from(m.addr)),
        );
        let servers = reply.entries.len();

        let receipt = ctx
            .delivery()
            .send_reliable(reply, sender, REGISTRY_REPLY_TTL);
        tracing::debug!(%sender, %receipt, servers, "registry reply queued");
        Ok(())
    }
}

/// Handles [`RegisterServer`]: records `sender.ip():port` as a server.
///
/// A port of `0` means "the port I'm sending from".
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterServerInterpreter;

impl<Ctx: NetworkContext> Interpreter<Ctx> for RegisterServerInterpreter {
    type Message = RegisterServer;

    fn interpret(
        &self,
        ctx: &Ctx,
        sender: SocketAddr,
        message: &RegisterServer,
    ) -> Result<(), CourierError> {
        let port = if message.port == 0 {
            sender.port()
        } else {
            message.port
        };
        ctx.members()
            .register_server(SocketAddr::new(sender.ip(), port))?;
        Ok(())
    }
}

/// Client side of the registry: forwards each [`ServerRegistry`] reply
/// to a channel.
#[derive(Debug, Clone)]
pub struct ServerRegistryListener {
    replies: mpsc::UnboundedSender<Vec<RegistryEntry>>,
}

impl ServerRegistryListener {
    /// Creates the listener and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<RegistryEntry>>) {
        let (replies, rx) = mpsc::unbounded_channel();
        (Self { replies }, rx)
    }
}

impl<Ctx: NetworkContext> Interpreter<Ctx> for ServerRegistryListener {
    type Message = ServerRegistry;

    fn interpret(
        &self,
        _: &Ctx,
        sender: SocketAddr,
        message: &ServerRegistry,
    ) -> Result<(), CourierError> {
        tracing::debug!(%sender, servers = message.entries.len(), "registry received");
        self.replies
            .send(message.entries.clone())
            .map_err(|_| ProtocolError::InvalidMessage("registry listener closed".into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use courier_pool::{Draft, MessagePool};
    use courier_protocol::{Message, Phase, Receipt};

    use super::*;
    use crate::registry::{InMemoryMembers, Member, RepositoryError};

    /// Captures every send instead of transmitting it.
    #[derive(Default)]
    struct CapturingDelivery {
        sent: Mutex<Vec<(Vec<RegistryEntry>, SocketAddr, u32)>>,
    }

    impl ReliableDelivery for CapturingDelivery {
        fn send_reliable<M: Message>(
            &self,
            message: Draft<M>,
            destination: SocketAddr,
            ttl: u32,
        ) -> Receipt {
            let json = serde_json::to_value(&*message).unwrap();
            let reply: ServerRegistry = serde_json::from_value(json).unwrap();
            self.sent
                .lock()
                .unwrap()
                .push((reply.entries, destination, ttl));
            Receipt(1)
        }
    }

    struct BrokenMembers;

    impl MemberRepository for BrokenMembers {
        fn members(&self) -> Result<Vec<Member>, RepositoryError> {
            Err(RepositoryError::Unavailable("offline".into()))
        }

        fn register_server(&self, _: SocketAddr) -> Result<(), RepositoryError> {
            Err(RepositoryError::Unavailable("offline".into()))
        }
    }

    struct TestContext<R> {
        members: R,
        delivery: CapturingDelivery,
        pool: MessagePool,
    }

    impl<R: MemberRepository> NetworkContext for TestContext<R> {
        type Members = R;
        type Delivery = CapturingDelivery;

        fn members(&self) -> &R {
            &self.members
        }

        fn delivery(&self) -> &CapturingDelivery {
            &self.delivery
        }

        fn pool(&self) -> &MessagePool {
            &self.pool
        }
    }

    fn context<R: MemberRepository>(members: R) -> TestContext<R> {
        TestContext {
            members,
            delivery: CapturingDelivery::default(),
            pool: MessagePool::new(),
        }
    }

    fn addr(last: u8, port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], port))
    }

    fn member(last: u8, port: u16, is_registered_server: bool) -> Member {
        Member {
            addr: addr(last, port),
            is_registered_server,
        }
    }

    fn client() -> SocketAddr {
        SocketAddr::from(([192, 168, 0, 9], 50000))
    }

    #[test]
    fn test_reply_lists_registered_servers_in_order() {
        let ctx = context(InMemoryMembers::with_members([
            member(3, 3000, true),
            member(4, 4000, false),
            member(1, 1000, true),
            member(2, 2000, true),
        ]));

        GetServerRegistryInterpreter
            .interpret(&ctx, client(), &GetServerRegistry)
            .unwrap();

        let sent = ctx.delivery.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (entries, destination, ttl) = &sent[0];
        assert_eq!(*destination, client());
        assert_eq!(*ttl, REGISTRY_REPLY_TTL);
        let got: Vec<_> = entries.iter().map(|e| (e.address.as_str(), e.port)).collect();
        assert_eq!(
            got,
            vec![("10.0.0.3", 3000), ("10.0.0.1", 1000), ("10.0.0.2", 2000)]
        );
    }

    #[test]
    fn test_no_servers_still_replies_once() {
        let ctx = context(InMemoryMembers::with_members([member(1, 1000, false)]));

        GetServerRegistryInterpreter
            .interpret(&ctx, client(), &GetServerRegistry)
            .unwrap();

        let sent = ctx.delivery.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.is_empty());
    }

    #[test]
    fn test_empty_repository_replies_empty() {
        let ctx = context(InMemoryMembers::new());
        GetServerRegistryInterpreter
            .interpret(&ctx, client(), &GetServerRegistry)
            .unwrap();
        assert_eq!(ctx.delivery.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unreadable_repository_replies_empty() {
        let ctx = context(BrokenMembers);

        GetServerRegistryInterpreter
            .interpret(&ctx, client(), &GetServerRegistry)
            .unwrap();

        let sent = ctx.delivery.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.is_empty());
        assert_eq!(sent[0].2, 0);
    }

    #[test]
    fn test_reply_comes_from_pool() {
        let ctx = context(InMemoryMembers::new());
        GetServerRegistryInterpreter
            .interpret(&ctx, client(), &GetServerRegistry)
            .unwrap();
        GetServerRegistryInterpreter
            .interpret(&ctx, client(), &GetServerRegistry)
            .unwrap();
        // The capturing delivery drops drafts unsent, so each query builds one.
        assert_eq!(ctx.pool.constructed::<ServerRegistry>(), 2);
    }

    #[test]
    fn test_concurrent_queries_each_reply_once() {
        let ctx = context(InMemoryMembers::with_members([member(1, 1000, true)]));
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    GetServerRegistryInterpreter
                        .interpret(&ctx, client(), &GetServerRegistry)
                        .unwrap();
                });
            }
        });
        let sent = ctx.delivery.sent.lock().unwrap();
        assert_eq!(sent.len(), 8);
        assert!(sent.iter().all(|(entries, _, _)| entries.len() == 1));
    }

    #[test]
    fn test_register_server_uses_sender_ip() {
        let ctx = context(InMemoryMembers::new());
        RegisterServerInterpreter
            .interpret(&ctx, addr(7, 61000), &RegisterServer { port: 15937 })
            .unwrap();

        let members = ctx.members.members().unwrap();
        assert_eq!(members, vec![member(7, 15937, true)]);
    }

    #[test]
    fn test_register_server_port_zero_uses_source_port() {
        let ctx = context(InMemoryMembers::new());
        RegisterServerInterpreter
            .interpret(&ctx, addr(7, 61000), &RegisterServer { port: 0 })
            .unwrap();
        assert_eq!(ctx.members.members().unwrap()[0].addr, addr(7, 61000));
    }

    #[test]
    fn test_register_server_repository_error_propagates() {
        let ctx = context(BrokenMembers);
        let err = RegisterServerInterpreter
            .interpret(&ctx, addr(7, 61000), &RegisterServer { port: 1 })
            .unwrap_err();
        assert!(matches!(err, CourierError::Repository(_)));
    }

    #[test]
    fn test_listener_forwards_entries() {
        let (listener, mut rx) = ServerRegistryListener::new();
        let ctx = context(InMemoryMembers::new());
        let reply = ServerRegistry {
            entries: vec![RegistryEntry::from(addr(1, 1000))],
        };

        listener.interpret(&ctx, addr(9, 9), &reply).unwrap();
        assert_eq!(rx.try_recv().unwrap(), reply.entries);
    }

    #[test]
    fn test_listener_closed_channel_is_error() {
        let (listener, rx) = ServerRegistryListener::new();
        drop(rx);
        let ctx = context(InMemoryMembers::new());
        assert!(
            listener
                .interpret(&ctx, addr(9, 9), &ServerRegistry::default())
                .is_err()
        );
    }

    #[test]
    fn test_draft_handed_over_unsealed() {
        let ctx = context(InMemoryMembers::new());
        let draft = ctx.pool.acquire::<ServerRegistry>().unwrap();
        assert_eq!(draft.lifecycle().phase(), Phase::Fresh);
        assert!(!draft.lifecycle().is_pooled());
        assert_eq!(draft.lifecycle().receipt(), None);
    }
}
