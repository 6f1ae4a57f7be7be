//! End-to-end scenarios from the coordinator's design notes, driven over
//! real UDP and TCP sockets against an in-process server.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use codec::{Endpoint, Request, RequestKind};
use registry::{DEFAULT_CAP, DEFAULT_TTL_SECS};
use rendezvous_server::config::{Config, Log, Tunables};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

async fn start_server(port: u16, cap: usize, ttl_secs: u64) -> SocketAddr {
    let bind: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let config = Arc::new(Config {
        bind,
        tunables: Tunables { cap, ttl_secs },
        log: Log::default(),
    });

    tokio::spawn(async move {
        let _ = rendezvous_server::startup(config).await;
    });

    // give the acceptor/reactor tasks time to bind both sockets.
    tokio::time::sleep(Duration::from_millis(100)).await;
    bind
}

async fn udp_client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

fn post(public_port: u16) -> [u8; Request::SIZE] {
    Request {
        kind: RequestKind::PostInfo,
        entry: Endpoint {
            ip: 0,
            private_port: 0,
            public_port,
        },
    }
    .to_bytes()
}

fn ask(server_ip: Ipv4Addr, public_port: u16) -> [u8; Request::SIZE] {
    Request {
        kind: RequestKind::AskInfo,
        entry: Endpoint::new(server_ip, 0, public_port),
    }
    .to_bytes()
}

#[tokio::test]
async fn basic_udp_rendezvous() {
    let server_addr = start_server(48810, DEFAULT_CAP, DEFAULT_TTL_SECS).await;

    let server = udp_client().await;
    server.send_to(&post(40000), server_addr).await.unwrap();

    // let the POST land before the ASK races it.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let client = udp_client().await;
    let server_local_ip = client.local_addr().unwrap().ip();
    let Some(server_ip) = (match server_local_ip {
        std::net::IpAddr::V4(v4) => Some(v4),
        _ => None,
    }) else {
        panic!("test client must bind IPv4");
    };

    client.send_to(&ask(server_ip, 40000), server_addr).await.unwrap();

    let mut buf = [0u8; Endpoint::SIZE];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let reply = Endpoint::decode(&buf[..n]).unwrap();
    assert_eq!(reply.public_port, 40000);
    assert_eq!(reply.private_port, server.local_addr().unwrap().port());

    let mut notify_buf = [0u8; Endpoint::SIZE];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), server.recv_from(&mut notify_buf))
        .await
        .unwrap()
        .unwrap();
    let notification = Endpoint::decode(&notify_buf[..n]).unwrap();
    assert_eq!(notification.private_port, client.local_addr().unwrap().port());
    assert_eq!(notification.public_port, 0);
}

#[tokio::test]
async fn ask_before_post_returns_sentinel() {
    let server_addr = start_server(48820, DEFAULT_CAP, DEFAULT_TTL_SECS).await;

    let client = udp_client().await;
    client.send_to(&ask(Ipv4Addr::new(10, 0, 0, 1), 40000), server_addr).await.unwrap();

    let mut buf = [0u8; Endpoint::SIZE];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let reply = Endpoint::decode(&buf[..n]).unwrap();
    assert_eq!(reply.private_port, 0);
    assert_eq!(reply.public_port, 40000);
}

#[tokio::test]
async fn ttl_expiry_produces_sentinel() {
    let server_addr = start_server(48830, DEFAULT_CAP, 1).await;

    let server = udp_client().await;
    server.send_to(&post(40000), server_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // past the 1-second TTL.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let client = udp_client().await;
    client.send_to(&ask(Ipv4Addr::new(127, 0, 0, 1), 40000), server_addr).await.unwrap();

    let mut buf = [0u8; Endpoint::SIZE];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let reply = Endpoint::decode(&buf[..n]).unwrap();
    assert_eq!(reply.private_port, 0, "entry should have expired");
}

#[tokio::test]
async fn cap_eviction_drops_the_oldest() {
    let server_addr = start_server(48840, 5, DEFAULT_TTL_SECS).await;

    let server = udp_client().await;
    for port in 1..=6u16 {
        server.send_to(&post(port), server_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let client = udp_client().await;
    let server_ip = Ipv4Addr::new(127, 0, 0, 1);

    client.send_to(&ask(server_ip, 1), server_addr).await.unwrap();
    let mut buf = [0u8; Endpoint::SIZE];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Endpoint::decode(&buf[..n]).unwrap().private_port, 0, "port 1 should have been evicted");

    for port in 2..=6u16 {
        client.send_to(&ask(server_ip, port), server_addr).await.unwrap();
        let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(Endpoint::decode(&buf[..n]).unwrap().private_port, 0, "port {port} should still be live");
    }
}

#[tokio::test]
async fn refresh_in_place_extends_deadline() {
    let server_addr = start_server(48850, DEFAULT_CAP, 30).await;

    let server = udp_client().await;
    server.send_to(&post(40000), server_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // a refresh roughly 1 second in; the original deadline (30s) would
    // still cover the final ask, but the point of this scenario is that
    // the refreshed deadline does too.
    server.send_to(&post(40000), server_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = udp_client().await;
    client.send_to(&ask(Ipv4Addr::new(127, 0, 0, 1), 40000), server_addr).await.unwrap();

    let mut buf = [0u8; Endpoint::SIZE];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(Endpoint::decode(&buf[..n]).unwrap().private_port, 0);
}

#[tokio::test]
async fn stream_bound_post_notifies_over_tcp() {
    let server_addr = start_server(48860, DEFAULT_CAP, DEFAULT_TTL_SECS).await;

    let mut server_stream = TcpStream::connect(server_addr).await.unwrap();
    let server_tcp_port = server_stream.local_addr().unwrap().port();
    server_stream.write_all(&post(40000)).await.unwrap();

    // give the reader task time to register the handle and deposit it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = udp_client().await;
    client.send_to(&ask(Ipv4Addr::new(127, 0, 0, 1), 40000), server_addr).await.unwrap();

    let mut buf = [0u8; Endpoint::SIZE];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let reply = Endpoint::decode(&buf[..n]).unwrap();
    assert_eq!(reply.private_port, server_tcp_port);

    let mut notify_buf = [0u8; Endpoint::SIZE];
    let n = tokio::time::timeout(Duration::from_secs(1), server_stream.read(&mut notify_buf))
        .await
        .unwrap()
        .unwrap();
    let notification = Endpoint::decode(&notify_buf[..n]).unwrap();
    assert_eq!(notification.private_port, client.local_addr().unwrap().port());
}

#[tokio::test]
async fn at_most_once_notification_after_ask_hit() {
    let server_addr = start_server(48870, DEFAULT_CAP, DEFAULT_TTL_SECS).await;

    let server = udp_client().await;
    server.send_to(&post(40000), server_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let client = udp_client().await;
    let server_ip = Ipv4Addr::new(127, 0, 0, 1);

    client.send_to(&ask(server_ip, 40000), server_addr).await.unwrap();
    let mut buf = [0u8; Endpoint::SIZE];
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(Endpoint::decode(&buf[..n]).unwrap().private_port, 0, "first ask should hit");

    client.send_to(&ask(server_ip, 40000), server_addr).await.unwrap();
    let (n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Endpoint::decode(&buf[..n]).unwrap().private_port, 0, "second ask must be a miss");
}
