//! Automatic protocol dispatch
//!
//! [`AutoHandler`] reads exactly one byte off an accepted connection and
//! routes by value: `0x04` to SOCKS4, `0x05` to SOCKS5, anything else to
//! HTTP. The byte is replayed through a [`BufferedStream`] so the chosen
//! handler sees the stream from byte zero.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::{Handler, HandlerOptions, HttpHandler, Socks4Handler, Socks5Handler};
use crate::error::HandlerError;
use crate::io::{BoxedStream, BufferedStream};

/// SOCKS4 version byte.
pub const SOCKS4_VERSION: u8 = 0x04;
/// SOCKS5 version byte.
pub const SOCKS5_VERSION: u8 = 0x05;

/// Protocol-discriminating handler.
pub struct AutoHandler {
    options: Arc<HandlerOptions>,
    socks4: Arc<dyn Handler>,
    socks5: Arc<dyn Handler>,
    http: Arc<dyn Handler>,
}

impl AutoHandler {
    /// Create a dispatcher with the built-in protocol handlers, all
    /// sharing the same options snapshot.
    pub fn new(options: Arc<HandlerOptions>) -> Self {
        Self {
            socks4: Arc::new(Socks4Handler::new(Arc::clone(&options))),
            socks5: Arc::new(Socks5Handler::new(Arc::clone(&options))),
            http: Arc::new(HttpHandler::new(Arc::clone(&options))),
            options,
        }
    }

    /// Replace the SOCKS4 route.
    #[must_use]
    pub fn with_socks4(mut self, handler: Arc<dyn Handler>) -> Self {
        self.socks4 = handler;
        self
    }

    /// Replace the SOCKS5 route.
    #[must_use]
    pub fn with_socks5(mut self, handler: Arc<dyn Handler>) -> Self {
        self.socks5 = handler;
        self
    }

    /// Replace the HTTP route.
    #[must_use]
    pub fn with_http(mut self, handler: Arc<dyn Handler>) -> Self {
        self.http = handler;
        self
    }
}

#[async_trait]
impl Handler for AutoHandler {
    async fn handle(&self, mut stream: BoxedStream, peer: SocketAddr) -> Result<(), HandlerError> {
        let mut first = [0u8; 1];
        stream
            .read_exact(&mut first)
            .await
            .map_err(|_| HandlerError::EarlyEof)?;

        let replayed: BoxedStream = Box::new(BufferedStream::with_prefix(vec![first[0]], stream));

        match first[0] {
            SOCKS4_VERSION => {
                // SOCKS4 carries no authentication; admitting it under a
                // credentialed config would silently bypass auth.
                if !self.options.users.is_empty() {
                    info!(%peer, "rejecting SOCKS4 while credentials are configured");
                    return Ok(());
                }
                debug!(%peer, "dispatch socks4");
                self.socks4.handle(replayed, peer).await
            }
            SOCKS5_VERSION => {
                debug!(%peer, "dispatch socks5");
                self.socks5.handle(replayed, peer).await
            }
            _ => {
                debug!(%peer, first = first[0], "dispatch http");
                self.http.handle(replayed, peer).await
            }
        }
    }
}
