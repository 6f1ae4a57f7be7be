//! The single-threaded main reactor (spec §4.3).
//!
//! Owns the registration table outright: nothing else ever holds `&mut
//! RegistrationTable`, so no lock guards the table itself. Each tick either
//! decodes a datagram or drains the pending-stream slot; a 1 ms datagram
//! timeout bounds how long a stream request can wait behind datagram
//! traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use codec::Request;
use registry::{Clock, RegistrationTable};

use crate::dispatch::{self, Channel, Origin};
use crate::handles::StreamHandles;
use crate::registrations::LiveCounts;
use crate::slot::SlotReceiver;
use crate::stats::Stats;

const DATAGRAM_POLL_TIMEOUT: Duration = Duration::from_millis(1);

pub async fn run(
    udp: UdpSocket,
    mut slot: SlotReceiver,
    mut table: RegistrationTable,
    handles: StreamHandles,
    stats: Arc<Stats>,
    live_counts: LiveCounts,
) {
    let clock = Clock::new();
    let mut buf = [0u8; 256];

    loop {
        match tokio::time::timeout(DATAGRAM_POLL_TIMEOUT, udp.recv_from(&mut buf)).await {
            Ok(Ok((n, peer_addr))) => {
                let origin = Origin {
                    peer_addr,
                    channel: Channel::Datagram,
                };
                process_frame(
                    &buf[..n],
                    origin,
                    &mut table,
                    &handles,
                    &udp,
                    stats.as_ref(),
                    &live_counts,
                    clock.now_secs(),
                )
                .await;
            }
            Ok(Err(e)) => {
                // Anything other than the poll timeout above is a failure
                // of the reactor's primary socket, which spec.md §4.6/§7
                // treat as fatal: there is no "continue without UDP" mode.
                log::error!("reactor: fatal udp recv_from failure, shutting down: {e}");
                return;
            }
            Err(_elapsed) => {
                if let Some(pending) = slot.drain() {
                    let origin = Origin {
                        peer_addr: pending.peer_addr,
                        channel: Channel::Stream(pending.handle),
                    };
                    process_frame(
                        &pending.bytes,
                        origin,
                        &mut table,
                        &handles,
                        &udp,
                        stats.as_ref(),
                        &live_counts,
                        clock.now_secs(),
                    )
                    .await;
                }
            }
        }
    }
}

async fn process_frame(
    bytes: &[u8],
    origin: Origin,
    table: &mut RegistrationTable,
    handles: &StreamHandles,
    udp: &UdpSocket,
    stats: &Stats,
    live_counts: &LiveCounts,
    now: u64,
) {
    match Request::decode(bytes) {
        Ok(request) => dispatch::dispatch(request, origin, table, handles, udp, stats, live_counts, now).await,
        Err(e) => {
            log::debug!("reactor: malformed frame from {}: {e}", origin.peer_addr);
            stats.record_malformed_frame();
        }
    }
}
