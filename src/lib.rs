#[cfg(feature = "api")]
pub mod api;

pub mod acceptor;
pub mod config;
pub mod dispatch;
pub mod handles;
pub mod logger;
pub mod reactor;
pub mod reader;
pub mod registrations;
pub mod slot;
pub mod stats;

use std::sync::Arc;

use tokio::net::UdpSocket;

use self::config::Config;
use self::handles::StreamHandles;
use self::registrations::LiveCounts;
use self::stats::Stats;

#[rustfmt::skip]
static SOFTWARE: &str = concat!(
    "rendezvous-server.",
    env!("CARGO_PKG_VERSION")
);

/// Wires up the registration table, the stream plumbing and the two
/// listening sockets, then runs until the process is killed. Exposed as a
/// function (rather than inlined in `main`) so integration tests can start
/// a coordinator in-process on an ephemeral port.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    // The datagram socket is this coordinator's primary channel: losing it
    // at startup is fatal. The stream listener is not — a `listen`
    // failure takes down the acceptor only, per spec.md §4.4/§7; the
    // reactor keeps serving UDP-only.
    let udp = UdpSocket::bind(config.bind).await?;

    log::info!("{SOFTWARE} listening on {}", config.bind);

    let table = registry::RegistrationTable::new(config.tunables.cap, config.tunables.ttl_secs);
    let handles = StreamHandles::new();
    let (slot_tx, slot_rx) = slot::channel();
    let stats = Arc::new(Stats::default());
    let live_counts = LiveCounts::new();

    match acceptor::bind(&config) {
        Ok(listener) => {
            tokio::spawn(acceptor::run(listener, handles.clone(), slot_tx));
        }
        Err(e) => {
            log::error!("stream acceptor: fatal bind/listen failure, continuing udp-only: {e}");
        }
    }

    tokio::spawn(reactor::run(udp, slot_rx, table, handles, stats.clone(), live_counts.clone()));

    #[cfg(feature = "api")]
    {
        api::start_server(config, stats, live_counts).await?;
    }

    // Keep the process alive if the introspection api is compiled out; the
    // reactor and acceptor tasks above run forever on their own.
    #[cfg(not(feature = "api"))]
    {
        let _ = (config, stats, live_counts);
        std::future::pending::<()>().await;
    }

    Ok(())
}
