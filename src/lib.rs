//! proxy-gateway: multi-protocol TCP proxy gateway
//!
//! A single listening endpoint that auto-detects the application protocol
//! on each inbound connection, applies access-control and routing policy,
//! and shuttles bytes to the chosen upstream.
//!
//! # Features
//!
//! - **Protocol auto-detection**: one peeked byte routes a connection to
//!   the SOCKS4, SOCKS5 or HTTP handler
//! - **SNI sniffing**: TLS `ClientHello` parsing and rewriting, with an
//!   obfuscation scheme for tunneling past SNI-based filters
//! - **Policy fabric**: bypass lists (IP/CIDR/domain-glob, reversible),
//!   a static hosts table and whitelist/blacklist authorization, all
//!   live-reloadable
//! - **Caching resolver**: pluggable nameservers over UDP, TCP and TLS
//!   with a TTL cache
//! - **Node selection**: round-robin / random / FIFO strategies with
//!   failure-aware filtering
//!
//! # Architecture
//!
//! ```text
//! Client → Listener → AutoHandler / SniHandler → Bypass / Hosts / Resolver
//!                                   ↓
//!                                 Chain → Upstream
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use proxy_gateway::handler::{AutoHandler, Handler, HandlerOptions};
//! use proxy_gateway::policy::Bypass;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = HandlerOptions::builder()
//!     .addr("127.0.0.1:8080")
//!     .bypass(Arc::new(Bypass::from_patterns(false, ["*.internal"])))
//!     .build();
//! let handler = Arc::new(AutoHandler::new(options));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! loop {
//!     let (conn, peer) = listener.accept().await?;
//!     let handler = Arc::clone(&handler);
//!     tokio::spawn(async move {
//!         let _ = handler.handle(Box::new(conn), peer).await;
//!     });
//! }
//! # }
//! ```
//!
//! # Modules
//!
//! - [`chain`]: upstream dialing contract and the direct dialer
//! - [`error`]: error types
//! - [`handler`]: protocol handlers and the auto dispatcher
//! - [`io`]: buffered-replay stream wrapper and the byte relay
//! - [`policy`]: bypass, hosts table and authorization
//! - [`reload`]: live-reload plumbing and the policy file grammar
//! - [`resolver`]: caching DNS resolver
//! - [`select`]: upstream node selection
//! - [`sni`]: SNI handler, connector and obfuscation codec

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

pub mod chain;
pub mod error;
pub mod handler;
pub mod io;
pub mod policy;
pub mod reload;
pub mod resolver;
pub mod select;
pub mod sni;

// Re-export commonly used types at the crate root
pub use chain::{Chain, DialOptions, DirectChain};
pub use error::{
    ChainError, GatewayError, HandlerError, ResolveError, SelectError, SniError,
};
pub use handler::{
    AutoHandler, Credential, Handler, HandlerOptions, HandlerOptionsBuilder, HttpHandler,
    Socks4Handler, Socks5Handler,
};
pub use io::{relay, BoxedStream, BufferedStream, RawStream, RelayResult};
pub use policy::{can_access, Bypass, Host, Hosts, Matcher, Permission, Permissions};
pub use reload::{spawn_file_reloader, Reloader};
pub use resolver::{NameServer, NameServerProtocol, Resolver};
pub use select::{
    strategy_from_name, FailFilter, FifoStrategy, Filter, Node, NodeSelector, RandomStrategy,
    RoundStrategy, SelectOptions, Strategy,
};
pub use sni::{
    decode_server_name, encode_server_name, ClientHello, SniClientStream, SniConnector,
    SniHandler,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
