//! Stream acceptor: owns the listening socket and spawns a reader task per
//! accepted connection.
//!
//! `listen` happens once during startup (see [`bind`]); this task only
//! loops on `accept`. A failure to bind/listen is fatal and surfaces as an
//! error from [`bind`]; a failure to `accept` is logged and retried after a
//! short backoff.

use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};

use crate::config::Config;
use crate::handles::StreamHandles;
use crate::reader;
use crate::slot::SlotSender;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);
const LISTEN_BACKLOG: u32 = 1024;

/// Bind and start listening on the configured address, enabling address and
/// port reuse the way the original coordinator's `setsockopt` calls do.
pub fn bind(config: &Config) -> anyhow::Result<TcpListener> {
    let addr = config.bind;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;

    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?)
}

/// Run the accept loop forever, spawning a reader task per connection.
pub async fn run(listener: TcpListener, handles: StreamHandles, slot: SlotSender) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let handles = handles.clone();
                let slot = slot.clone();
                tokio::spawn(async move {
                    reader::handle_connection(stream, peer_addr, handles, slot).await;
                });
            }
            Err(e) => {
                log::warn!("stream acceptor: accept failed: {e}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}
