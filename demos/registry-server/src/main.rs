//! A standalone server registry.
//!
//! ```text
//! registry-server [BIND_ADDR] [SERVER_ADDR...]
//! ```
//!
//! `SERVER_ADDR`s are listed as registered servers from the start; game
//! servers can also announce themselves with `RegisterServer`. Set
//! `RUST_LOG=debug` to watch individual queries.

use std::net::SocketAddr;

use courier::prelude::*;
use courier::registry::{GetServerRegistryInterpreter, InMemoryMembers, RegisterServerInterpreter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let bind = args.next().unwrap_or_else(|| "0.0.0.0:15940".to_string());
    let seeded = args
        .map(|arg| arg.parse::<SocketAddr>())
        .collect::<Result<Vec<_>, _>>()?;

    let members = InMemoryMembers::with_members(seeded.into_iter().map(|addr| Member {
        addr,
        is_registered_server: true,
    }));

    let mut node = CourierNode::builder().bind(&bind).build(members).await?;
    node.register(GetServerRegistryInterpreter);
    node.register(RegisterServerInterpreter);

    tracing::info!(addr = %node.local_addr()?, "registry listening");
    node.run_until(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    tracing::info!("registry stopped");
    Ok(())
}
