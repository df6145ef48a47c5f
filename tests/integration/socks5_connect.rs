//! SOCKS5 CONNECT through the full gateway stack
//!
//! Runs the auto dispatcher with the real SOCKS5 handler and the direct
//! chain against a loopback echo server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;

use proxy_gateway::handler::{AutoHandler, Credential, Handler, HandlerOptions};
use proxy_gateway::policy::Bypass;

async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok(n) = conn.read(&mut buf).await {
                    if n == 0 || conn.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

fn spawn_gateway(options: Arc<HandlerOptions>) -> DuplexStream {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let handler = AutoHandler::new(options);
    tokio::spawn(async move {
        let peer: SocketAddr = "192.0.2.30:42000".parse().unwrap();
        let _ = handler.handle(Box::new(server), peer).await;
    });
    client
}

/// Send the SOCKS5 CONNECT preamble for `target` and assert success.
async fn connect_via_socks5(client: &mut DuplexStream, target: SocketAddr) {
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    match target.ip() {
        std::net::IpAddr::V4(ip) => request.extend_from_slice(&ip.octets()),
        std::net::IpAddr::V6(_) => unreachable!("test uses IPv4"),
    }
    request.extend_from_slice(&target.port().to_be_bytes());
    client.write_all(&request).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[1], 0x00, "CONNECT should succeed");
}

#[tokio::test]
async fn connect_and_echo_without_auth() {
    let echo = spawn_echo_server().await;
    let mut client = spawn_gateway(HandlerOptions::builder().build());

    // Method negotiation: offer NO AUTH
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut chosen = [0u8; 2];
    client.read_exact(&mut chosen).await.unwrap();
    assert_eq!(chosen, [0x05, 0x00]);

    connect_via_socks5(&mut client, echo).await;

    client.write_all(b"echo me please").await.unwrap();
    let mut got = [0u8; 14];
    client.read_exact(&mut got).await.unwrap();
    assert_eq!(&got, b"echo me please");
}

#[tokio::test]
async fn connect_with_username_password() {
    let echo = spawn_echo_server().await;
    let options = HandlerOptions::builder()
        .users(vec![Credential::new("alice", "secret")])
        .build();
    let mut client = spawn_gateway(options);

    // Offer both NO AUTH and USERNAME/PASSWORD; the server must pick auth
    client.write_all(&[0x05, 0x02, 0x00, 0x02]).await.unwrap();
    let mut chosen = [0u8; 2];
    client.read_exact(&mut chosen).await.unwrap();
    assert_eq!(chosen, [0x05, 0x02]);

    // RFC 1929 subnegotiation
    let mut auth = vec![0x01, 5];
    auth.extend_from_slice(b"alice");
    auth.push(6);
    auth.extend_from_slice(b"secret");
    client.write_all(&auth).await.unwrap();

    let mut status = [0u8; 2];
    client.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [0x01, 0x00]);

    connect_via_socks5(&mut client, echo).await;

    client.write_all(b"authed traffic").await.unwrap();
    let mut got = [0u8; 14];
    client.read_exact(&mut got).await.unwrap();
    assert_eq!(&got, b"authed traffic");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let options = HandlerOptions::builder()
        .users(vec![Credential::new("alice", "secret")])
        .build();
    let mut client = spawn_gateway(options);

    client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
    let mut chosen = [0u8; 2];
    client.read_exact(&mut chosen).await.unwrap();
    assert_eq!(chosen, [0x05, 0x02]);

    let mut auth = vec![0x01, 5];
    auth.extend_from_slice(b"alice");
    auth.push(5);
    auth.extend_from_slice(b"wrong");
    client.write_all(&auth).await.unwrap();

    let mut status = [0u8; 2];
    client.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [0x01, 0x01]);

    // The gateway closes after the failure reply
    let mut probe = [0u8; 1];
    assert_eq!(client.read(&mut probe).await.unwrap(), 0);
}

#[tokio::test]
async fn bypassed_target_is_not_dialed() {
    let echo = spawn_echo_server().await;
    let options = HandlerOptions::builder()
        .bypass(Arc::new(Bypass::from_patterns(false, ["127.0.0.1"])))
        .build();
    let mut client = spawn_gateway(options);

    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut chosen = [0u8; 2];
    client.read_exact(&mut chosen).await.unwrap();

    let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
    request.extend_from_slice(&echo.port().to_be_bytes());
    client.write_all(&request).await.unwrap();

    // Closed without any reply
    let mut probe = [0u8; 1];
    assert_eq!(client.read(&mut probe).await.unwrap(), 0);
}
