//! Server-side SNI handler
//!
//! Peeks the five-byte TLS record header. Anything that is not a
//! handshake record is treated as plaintext HTTP and delegated, header
//! bytes replayed. For handshake records the full first record is read,
//! the effective hostname recovered (de-obfuscating the `0xFFFE`
//! extension when present), policy applied against `host:443`, and the
//! rebuilt record forwarded upstream ahead of the byte relay.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::clienthello::{CONTENT_TYPE_HANDSHAKE, MAX_FRAGMENT_LEN, RECORD_HEADER_LEN};
use super::{rewrite_client_hello_record, Side};
use crate::error::{HandlerError, SniError};
use crate::handler::{Handler, HandlerOptions, HttpHandler};
use crate::io::{relay, BoxedStream, BufferedStream};

/// SNI proxy server handler.
pub struct SniHandler {
    options: Arc<HandlerOptions>,
    http: Arc<dyn Handler>,
}

impl SniHandler {
    pub fn new(options: Arc<HandlerOptions>) -> Self {
        Self {
            http: Arc::new(HttpHandler::new(Arc::clone(&options))),
            options,
        }
    }

    /// Replace the plaintext HTTP route.
    #[must_use]
    pub fn with_http(mut self, handler: Arc<dyn Handler>) -> Self {
        self.http = handler;
        self
    }
}

#[async_trait]
impl Handler for SniHandler {
    async fn handle(&self, mut stream: BoxedStream, peer: SocketAddr) -> Result<(), HandlerError> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|_| HandlerError::EarlyEof)?;

        if header[0] != CONTENT_TYPE_HANDSHAKE {
            debug!(%peer, "not TLS, delegating to http");
            let replayed: BoxedStream =
                Box::new(BufferedStream::with_prefix(header.to_vec(), stream));
            return self.http.handle(replayed, peer).await;
        }

        let frag_len = usize::from(u16::from_be_bytes([header[3], header[4]]));
        if frag_len == 0 || frag_len > MAX_FRAGMENT_LEN {
            return Err(SniError::RecordLength(frag_len).into());
        }
        let mut record = header.to_vec();
        record.resize(RECORD_HEADER_LEN + frag_len, 0);
        stream.read_exact(&mut record[RECORD_HEADER_LEN..]).await?;

        let (rebuilt, host) = rewrite_client_hello_record(&record, "", Side::Server)?;
        if host.is_empty() {
            return Err(SniError::Malformed("no server name").into());
        }
        let target = format!("{host}:443");
        debug!(%peer, target = %target, "sni target");

        if !self.options.authorized(&target) {
            return Ok(());
        }
        if self.options.bypassed(&target) {
            return Ok(());
        }

        let mut upstream = self
            .options
            .chain
            .dial(&target, &self.options.dial_options())
            .await?;
        upstream.write_all(&rebuilt).await?;

        info!(%peer, target = %target, "sni relay open");
        let result = relay(&mut stream, &mut upstream).await?;
        info!(
            %peer,
            target = %target,
            sent = result.client_to_upstream,
            received = result.upstream_to_client,
            "sni relay closed"
        );
        Ok(())
    }
}
