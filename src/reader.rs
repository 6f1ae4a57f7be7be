//! Per-connection stream reader.
//!
//! Spawned once per accepted connection: blocks on a single read, then
//! contends for the pending-stream slot. On a short read or I/O error, the
//! connection is dropped without ever touching the slot or the handle
//! arena — no side effect, per the transient-I/O error taxonomy.

use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::handles::StreamHandles;
use crate::slot::{PendingStreamRequest, SlotSender};

/// Larger than a well-formed request frame so an oversized or garbage read
/// is reported as a length mismatch instead of being silently truncated.
const READ_BUF_SIZE: usize = 256;

pub async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handles: StreamHandles,
    slot: SlotSender,
) {
    let mut buf = vec![0u8; READ_BUF_SIZE];

    let n = match stream.read(&mut buf).await {
        Ok(0) => {
            log::debug!("stream reader: connection closed before a request arrived: {peer_addr}");
            return;
        }
        Ok(n) => n,
        Err(e) => {
            log::warn!("stream reader: read failed for {peer_addr}: {e}");
            return;
        }
    };

    buf.truncate(n);

    let (_read_half, write_half) = stream.into_split();
    let handle = handles.insert(write_half);

    slot.deposit(PendingStreamRequest {
        peer_addr,
        handle,
        bytes: buf,
    })
    .await;
}
