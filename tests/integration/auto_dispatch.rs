//! Auto-dispatch end-to-end scenarios
//!
//! Exercises the one-byte protocol sniff through the public API with
//! recording handlers standing in for the protocol state machines.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;

use proxy_gateway::handler::{AutoHandler, Credential, Handler, HandlerOptions};
use proxy_gateway::{BoxedStream, HandlerError};

/// Captures the protocol route taken and every byte the route observed.
struct Recording {
    name: &'static str,
    seen: Arc<Mutex<Vec<(&'static str, Vec<u8>)>>>,
}

#[async_trait]
impl Handler for Recording {
    async fn handle(&self, mut stream: BoxedStream, _peer: SocketAddr) -> Result<(), HandlerError> {
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await?;
        self.seen.lock().push((self.name, data));
        Ok(())
    }
}

fn recording_auto(
    users: Vec<Credential>,
) -> (AutoHandler, Arc<Mutex<Vec<(&'static str, Vec<u8>)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let auto = AutoHandler::new(HandlerOptions::builder().users(users).build())
        .with_socks4(Arc::new(Recording {
            name: "socks4",
            seen: Arc::clone(&seen),
        }))
        .with_socks5(Arc::new(Recording {
            name: "socks5",
            seen: Arc::clone(&seen),
        }))
        .with_http(Arc::new(Recording {
            name: "http",
            seen: Arc::clone(&seen),
        }));
    (auto, seen)
}

fn peer() -> SocketAddr {
    "192.0.2.10:40000".parse().unwrap()
}

#[tokio::test]
async fn socks5_preamble_reaches_handler_at_offset_zero() {
    let (auto, seen) = recording_auto(Vec::new());

    let stream: BoxedStream = Box::new(std::io::Cursor::new(vec![0x05, 0x01, 0x00]));
    auto.handle(stream, peer()).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "socks5");
    assert_eq!(seen[0].1, vec![0x05, 0x01, 0x00]);
}

#[tokio::test]
async fn socks4_with_users_closes_without_routing() {
    let (auto, seen) = recording_auto(vec![Credential::new("alice", "secret")]);

    let stream: BoxedStream = Box::new(std::io::Cursor::new(vec![0x04, 0x01, 0x00, 0x50]));
    auto.handle(stream, peer()).await.unwrap();

    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn socks4_without_users_routes() {
    let (auto, seen) = recording_auto(Vec::new());

    let stream: BoxedStream = Box::new(std::io::Cursor::new(vec![0x04, 0x01]));
    auto.handle(stream, peer()).await.unwrap();

    assert_eq!(seen.lock()[0].0, "socks4");
}

#[tokio::test]
async fn ascii_byte_routes_to_http() {
    let (auto, seen) = recording_auto(Vec::new());

    let request = b"GET http://example.com/ HTTP/1.1\r\n\r\n".to_vec();
    let stream: BoxedStream = Box::new(std::io::Cursor::new(request.clone()));
    auto.handle(stream, peer()).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen[0].0, "http");
    assert_eq!(seen[0].1, request);
}

#[tokio::test]
async fn dispatch_works_over_a_socket() {
    use tokio::io::AsyncWriteExt;

    let (auto, seen) = recording_auto(Vec::new());
    let (mut client, server) = tokio::io::duplex(1024);

    let task = tokio::spawn(async move {
        auto.handle(Box::new(server), peer()).await.unwrap();
    });

    client.write_all(&[0x05, 0x02, 0x00, 0x02]).await.unwrap();
    client.shutdown().await.unwrap();
    task.await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen[0].0, "socks5");
    assert_eq!(seen[0].1, vec![0x05, 0x02, 0x00, 0x02]);
}
