//! SNI obfuscation end-to-end scenarios
//!
//! Drives a ClientHello through the client-side connector and the
//! server-side handler, with a mock chain standing in for the upstream
//! dialer, and checks the wire bytes at every hop.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use proxy_gateway::handler::{Handler, HandlerOptions};
use proxy_gateway::policy::Bypass;
use proxy_gateway::sni::clienthello::{
    ClientHello, EXT_OBFUSCATED_NAME, RECORD_HEADER_LEN,
};
use proxy_gateway::sni::{decode_server_name, SniConnector, SniHandler};
use proxy_gateway::{BoxedStream, Chain, ChainError, DialOptions};

/// Chain that records the dialed target and hands back a duplex end.
struct MockChain {
    dialed: Arc<Mutex<Vec<String>>>,
    upstream: Mutex<Option<DuplexStream>>,
}

impl MockChain {
    fn new() -> (Arc<Self>, DuplexStream, Arc<Mutex<Vec<String>>>) {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let dialed = Arc::new(Mutex::new(Vec::new()));
        let chain = Arc::new(Self {
            dialed: Arc::clone(&dialed),
            upstream: Mutex::new(Some(near)),
        });
        (chain, far, dialed)
    }
}

#[async_trait]
impl Chain for MockChain {
    async fn dial(&self, addr: &str, _opts: &DialOptions) -> Result<BoxedStream, ChainError> {
        self.dialed.lock().push(addr.to_string());
        let upstream = self.upstream.lock().take().expect("single dial expected");
        Ok(Box::new(upstream))
    }
}

fn hello_record(sni: &str) -> Vec<u8> {
    let mut hello = ClientHello {
        version: 0x0303,
        random: [3u8; 32],
        session_id: vec![0x11; 16],
        cipher_suites: vec![0x13, 0x01, 0x13, 0x03],
        compression_methods: vec![0x00],
        extensions: Vec::new(),
    };
    hello.set_server_name(sni);
    hello.into_record(0x0301)
}

fn peer() -> SocketAddr {
    "192.0.2.20:41000".parse().unwrap()
}

/// Rewrite a record through the client-side connector and return the
/// bytes that went on the wire.
async fn through_connector(decoy: &str, payload: &[u8]) -> Vec<u8> {
    let (near, mut far) = tokio::io::duplex(64 * 1024);
    let connector = SniConnector::new(decoy);
    let mut stream = connector.connect(Box::new(near), "real.example:443");

    stream.write_all(payload).await.unwrap();
    stream.flush().await.unwrap();
    drop(stream);

    let mut sent = Vec::new();
    far.read_to_end(&mut sent).await.unwrap();
    sent
}

#[tokio::test]
async fn client_rewrite_hides_real_name() {
    let obfuscated = through_connector("decoy.example", &hello_record("real.example")).await;

    let hello = ClientHello::decode(&obfuscated[RECORD_HEADER_LEN..]).unwrap();
    assert_eq!(hello.server_name().as_deref(), Some("decoy.example"));

    let ext = hello
        .extensions
        .iter()
        .find(|e| e.typ == EXT_OBFUSCATED_NAME)
        .expect("obfuscation extension");
    let recovered = decode_server_name(std::str::from_utf8(&ext.data).unwrap()).unwrap();
    assert_eq!(recovered, "real.example");
}

#[tokio::test]
async fn server_restores_name_and_forwards() {
    let obfuscated = through_connector("decoy.example", &hello_record("real.example")).await;

    let (chain, mut upstream, dialed) = MockChain::new();
    let handler = SniHandler::new(HandlerOptions::builder().chain(chain).build());

    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(async move { handler.handle(Box::new(server), peer()).await });

    client.write_all(&obfuscated).await.unwrap();

    // Read the rebuilt record off the mock upstream
    let mut header = [0u8; RECORD_HEADER_LEN];
    upstream.read_exact(&mut header).await.unwrap();
    let frag_len = usize::from(u16::from_be_bytes([header[3], header[4]]));
    let mut fragment = vec![0u8; frag_len];
    upstream.read_exact(&mut fragment).await.unwrap();

    let forwarded = ClientHello::decode(&fragment).unwrap();
    assert_eq!(forwarded.server_name().as_deref(), Some("real.example"));
    assert!(!forwarded
        .extensions
        .iter()
        .any(|e| e.typ == EXT_OBFUSCATED_NAME));

    // Policy and dialing happened against the recovered name
    assert_eq!(dialed.lock().as_slice(), ["real.example:443"]);

    // The relay is live in both directions
    upstream.write_all(b"server-bytes").await.unwrap();
    let mut got = [0u8; 12];
    client.read_exact(&mut got).await.unwrap();
    assert_eq!(&got, b"server-bytes");

    client.write_all(b"client-bytes").await.unwrap();
    let mut got = [0u8; 12];
    upstream.read_exact(&mut got).await.unwrap();
    assert_eq!(&got, b"client-bytes");

    drop(client);
    drop(upstream);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn plain_sni_is_forwarded_unobfuscated() {
    let (chain, mut upstream, dialed) = MockChain::new();
    let handler = SniHandler::new(HandlerOptions::builder().chain(chain).build());

    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(async move { handler.handle(Box::new(server), peer()).await });

    client.write_all(&hello_record("plain.example")).await.unwrap();

    let mut header = [0u8; RECORD_HEADER_LEN];
    upstream.read_exact(&mut header).await.unwrap();
    let frag_len = usize::from(u16::from_be_bytes([header[3], header[4]]));
    let mut fragment = vec![0u8; frag_len];
    upstream.read_exact(&mut fragment).await.unwrap();

    let forwarded = ClientHello::decode(&fragment).unwrap();
    assert_eq!(forwarded.server_name().as_deref(), Some("plain.example"));
    assert_eq!(dialed.lock().as_slice(), ["plain.example:443"]);

    drop(client);
    drop(upstream);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn bypassed_target_closes_without_dialing() {
    let (chain, _upstream, dialed) = MockChain::new();
    let handler = SniHandler::new(
        HandlerOptions::builder()
            .chain(chain)
            .bypass(Arc::new(Bypass::from_patterns(false, ["*.blocked.example"])))
            .build(),
    );

    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(async move { handler.handle(Box::new(server), peer()).await });

    client
        .write_all(&hello_record("www.blocked.example"))
        .await
        .unwrap();

    task.await.unwrap().unwrap();
    assert!(dialed.lock().is_empty());
}

#[tokio::test]
async fn http_first_write_carries_encoded_target() {
    let sent = through_connector(
        "cdn.example",
        b"GET / HTTP/1.1\r\nHost: blocked.example\r\n\r\n",
    )
    .await;
    let text = String::from_utf8(sent).unwrap();

    assert!(text.contains("Host: cdn.example\r\n"));
    let encoded = text
        .lines()
        .find_map(|l| l.strip_prefix("Gost-Target: "))
        .expect("Gost-Target header");
    assert_eq!(decode_server_name(encoded.trim()).unwrap(), "blocked.example");
}
