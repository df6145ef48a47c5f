//! Resolver end-to-end scenarios against mock nameservers
//!
//! A loopback UDP (and TCP) nameserver counts the queries it answers, so
//! the cache and literal short-circuit behavior are observable from the
//! outside.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use proxy_gateway::reload::Reloader;
use proxy_gateway::resolver::{NameServer, NameServerProtocol, Resolver};

fn answer_for(query: &Message, ip: Ipv4Addr) -> Message {
    let mut response = Message::new();
    response.set_id(query.id());
    response.set_message_type(MessageType::Response);
    response.set_recursion_desired(true);
    response.set_recursion_available(true);
    if let Some(q) = query.queries().first() {
        response.add_query(q.clone());
        if q.query_type() == RecordType::A {
            let mut record = Record::new();
            record
                .set_name(q.name().clone())
                .set_record_type(RecordType::A)
                .set_dns_class(DNSClass::IN)
                .set_ttl(60)
                .set_data(Some(RData::A(A(ip))));
            response.add_answer(record);
        }
    }
    response
}

/// UDP nameserver answering every A query with `ip`, counting queries.
async fn spawn_udp_nameserver(ip: Ipv4Addr) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&queries);
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            counter.fetch_add(1, Ordering::SeqCst);
            let query = Message::from_vec(&buf[..n]).unwrap();
            let response = answer_for(&query, ip).to_vec().unwrap();
            socket.send_to(&response, from).await.unwrap();
        }
    });
    (addr, queries)
}

/// TCP nameserver with RFC 1035 two-byte framing.
async fn spawn_tcp_nameserver(ip: Ipv4Addr) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&queries);
    tokio::spawn(async move {
        while let Ok((mut conn, _)) = listener.accept().await {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                loop {
                    let mut len = [0u8; 2];
                    if conn.read_exact(&mut len).await.is_err() {
                        return;
                    }
                    let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len))];
                    if conn.read_exact(&mut buf).await.is_err() {
                        return;
                    }
                    counter.fetch_add(1, Ordering::SeqCst);

                    let query = Message::from_vec(&buf).unwrap();
                    let response = answer_for(&query, ip).to_vec().unwrap();
                    conn.write_all(&(response.len() as u16).to_be_bytes())
                        .await
                        .unwrap();
                    conn.write_all(&response).await.unwrap();
                }
            });
        }
    });
    (addr, queries)
}

#[tokio::test]
async fn second_resolution_within_ttl_hits_cache() {
    let (addr, queries) = spawn_udp_nameserver(Ipv4Addr::new(192, 0, 2, 42)).await;

    let resolver = Resolver::new(vec![NameServer::new(addr.to_string())])
        .with_timeout(Duration::from_secs(2))
        .with_ttl(Duration::from_secs(30));

    let first = resolver.resolve("cached.example").await.unwrap();
    let second = resolver.resolve("cached.example").await.unwrap();

    assert_eq!(first, vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 42))]);
    assert_eq!(first, second);
    // One upstream query served both resolutions
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ip_literal_never_queries_upstream() {
    let (addr, queries) = spawn_udp_nameserver(Ipv4Addr::new(192, 0, 2, 1)).await;

    let resolver = Resolver::new(vec![NameServer::new(addr.to_string())])
        .with_timeout(Duration::from_secs(2));

    let ips = resolver.resolve("203.0.113.7").await.unwrap();
    assert_eq!(ips, vec![IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))]);
    assert_eq!(queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn disabled_cache_queries_every_time() {
    let (addr, queries) = spawn_udp_nameserver(Ipv4Addr::new(192, 0, 2, 9)).await;

    let resolver = Resolver::new(vec![NameServer::new(addr.to_string())])
        .with_timeout(Duration::from_secs(2))
        .without_cache();

    resolver.resolve("nocache.example").await.unwrap();
    resolver.resolve("nocache.example").await.unwrap();
    assert_eq!(queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn tcp_nameserver_round_trip() {
    let (addr, queries) = spawn_tcp_nameserver(Ipv4Addr::new(192, 0, 2, 77)).await;

    let resolver = Resolver::new(vec![
        NameServer::new(addr.to_string()).with_protocol(NameServerProtocol::Tcp)
    ])
    .with_timeout(Duration::from_secs(2));

    let ips = resolver.resolve("tcp.example").await.unwrap();
    assert_eq!(ips, vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 77))]);
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_first_server_falls_through_to_second() {
    // Bind-then-drop leaves a TCP port that refuses connections.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let (addr, queries) = spawn_tcp_nameserver(Ipv4Addr::new(192, 0, 2, 88)).await;

    let resolver = Resolver::new(vec![
        NameServer::new(dead_addr.to_string()).with_protocol(NameServerProtocol::Tcp),
        NameServer::new(addr.to_string()).with_protocol(NameServerProtocol::Tcp),
    ])
    .with_timeout(Duration::from_secs(2));

    let ips = resolver.resolve("failover.example").await.unwrap();
    assert_eq!(ips, vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 88))]);
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reloaded_config_drives_lookup() {
    let (addr, queries) = spawn_udp_nameserver(Ipv4Addr::new(192, 0, 2, 55)).await;

    let resolver = Resolver::default();
    let config = format!("timeout 2s\nttl 30s\n{addr} udp\n");
    resolver
        .reload(&mut std::io::Cursor::new(config))
        .unwrap();

    resolver.resolve("reloaded.example").await.unwrap();
    resolver.resolve("reloaded.example").await.unwrap();
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}
