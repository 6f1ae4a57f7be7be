//! POST/ASK request dispatcher (spec §4.2).
//!
//! Owns no state of its own: it borrows the registration table, the stream
//! handle arena, the shared UDP socket and the stats counters for the
//! duration of one request. The reactor is the only caller and the only
//! thing that ever holds `&mut RegistrationTable`, so there is no locking
//! here.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;

use codec::{Endpoint, Request, RequestKind};
use registry::{HandleId, RegistrationTable};

use crate::handles::StreamHandles;
use crate::registrations::LiveCounts;
use crate::stats::Stats;

/// The channel a request arrived on, and the channel a reply to its sender
/// goes back out on — always the same one.
#[derive(Debug, Clone, Copy)]
pub enum Channel {
    Datagram,
    Stream(HandleId),
}

/// Where a request came from: who it is (for POST's observed endpoint and
/// ASK's server notification) and how to talk back to them.
#[derive(Debug, Clone, Copy)]
pub struct Origin {
    pub peer_addr: SocketAddr,
    pub channel: Channel,
}

fn ipv4_of(addr: SocketAddr) -> Option<Ipv4Addr> {
    match addr {
        SocketAddr::V4(v4) => Some(*v4.ip()),
        SocketAddr::V6(_) => None,
    }
}

async fn send_via(channel: Channel, bytes: &[u8], peer_addr: SocketAddr, handles: &StreamHandles, udp: &UdpSocket) {
    match channel {
        Channel::Datagram => {
            if let Err(e) = udp.send_to(bytes, peer_addr).await {
                log::warn!("dispatch: udp send to {peer_addr} failed: {e}");
            }
        }
        Channel::Stream(id) => {
            handles.send(id, bytes).await;
        }
    }
}

/// Dispatch one decoded request. `now` is the reactor's clock reading for
/// this tick.
pub async fn dispatch(
    request: Request,
    origin: Origin,
    table: &mut RegistrationTable,
    handles: &StreamHandles,
    udp: &UdpSocket,
    stats: &Stats,
    live_counts: &LiveCounts,
    now: u64,
) {
    let Some(observed_ip) = ipv4_of(origin.peer_addr) else {
        log::warn!("dispatch: ignoring request from non-IPv4 peer {}", origin.peer_addr);
        return;
    };

    log::trace!("dispatch: {:?} from {} via {:?}", request.kind, origin.peer_addr, origin.channel);

    match request.kind {
        RequestKind::PostInfo => {
            handle_post(request.entry, observed_ip, origin, table, handles, stats, live_counts, now)
        }
        RequestKind::AskInfo => {
            handle_ask(request.entry, observed_ip, origin, table, handles, udp, stats, live_counts, now).await
        }
    }
}

fn handle_post(
    entry: Endpoint,
    observed_ip: Ipv4Addr,
    origin: Origin,
    table: &mut RegistrationTable,
    handles: &StreamHandles,
    stats: &Stats,
    live_counts: &LiveCounts,
    now: u64,
) {
    let endpoint = Endpoint::new(observed_ip, origin.peer_addr.port(), entry.public_port);
    let stream_handle = match origin.channel {
        Channel::Stream(id) => Some(id),
        Channel::Datagram => None,
    };

    let report = table.upsert(observed_ip, endpoint, stream_handle, now);

    match report.outcome {
        registry::UpsertOutcome::Refreshed => {
            stats.record_refresh();
            log::trace!("post: refreshed {observed_ip}:{}", endpoint.public_port);
        }
        registry::UpsertOutcome::Inserted => {
            stats.record_post();
            log::info!("post: registered {observed_ip}:{}", endpoint.public_port);
        }
    }

    if report.evicted {
        stats.record_cap_eviction();
        log::info!("post: cap eviction for {observed_ip}");
    }

    if let Some(closed) = report.closed_handle {
        handles.close(closed);
    }

    live_counts.set(observed_ip, table.live_len(observed_ip, now));
}

async fn handle_ask(
    entry: Endpoint,
    observed_ip: Ipv4Addr,
    origin: Origin,
    table: &mut RegistrationTable,
    handles: &StreamHandles,
    udp: &UdpSocket,
    stats: &Stats,
    live_counts: &LiveCounts,
    now: u64,
) {
    let requested_ip = entry.ip();

    let outcome = table.consume(requested_ip, entry.public_port, now);
    live_counts.set(requested_ip, table.live_len(requested_ip, now));

    match outcome {
        Some(hit) => {
            stats.record_ask_hit();
            log::info!("ask: hit for {requested_ip}:{} from {}", entry.public_port, origin.peer_addr);

            let asker_private_port = origin.peer_addr.port();
            let notification = Endpoint::new(observed_ip, asker_private_port, 0);
            let server_addr = SocketAddr::new(hit.endpoint.ip().into(), hit.endpoint.private_port);

            let server_channel = match hit.stream_handle {
                Some(id) => Channel::Stream(id),
                None => Channel::Datagram,
            };
            send_via(server_channel, &notification.to_bytes(), server_addr, handles, udp).await;

            if let Some(id) = hit.stream_handle {
                handles.close(id);
            }

            send_via(origin.channel, &hit.endpoint.to_bytes(), origin.peer_addr, handles, udp).await;
        }
        None => {
            stats.record_ask_miss();
            log::info!("ask: miss for {requested_ip}:{} from {}", entry.public_port, origin.peer_addr);
            let sentinel = Endpoint::not_found(entry.ip, entry.public_port);
            send_via(origin.channel, &sentinel.to_bytes(), origin.peer_addr, handles, udp).await;
        }
    }
}
