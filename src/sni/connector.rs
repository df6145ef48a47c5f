//! Client-side SNI obfuscation
//!
//! [`SniConnector`] wraps an established connection so that the first
//! payload written through it is rewritten before it leaves:
//!
//! - a TLS ClientHello gets the real `server_name` hidden in the `0xFFFE`
//!   extension and replaced with the configured decoy host;
//! - anything else is treated as plaintext HTTP, its `Host` header
//!   swapped for the decoy and the encoded original appended in a
//!   `Gost-Target` header.
//!
//! Subsequent writes pass through verbatim. With no decoy host configured
//! the wrapper is a no-op.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

use super::clienthello::CONTENT_TYPE_HANDSHAKE;
use super::obfs::encode_server_name;
use super::{rewrite_client_hello_record, Side};
use crate::io::BoxedStream;

/// Factory for [`SniClientStream`]s sharing one decoy host.
#[derive(Debug, Clone)]
pub struct SniConnector {
    host: String,
}

impl SniConnector {
    /// `host` is the decoy presented to filters; empty disables rewriting.
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Wrap a connection headed for `addr`.
    pub fn connect(&self, stream: BoxedStream, addr: impl Into<String>) -> SniClientStream {
        SniClientStream {
            inner: stream,
            addr: addr.into(),
            host: self.host.clone(),
            obfuscated: false,
            pending: Vec::new(),
            pending_pos: 0,
        }
    }
}

/// A connection whose first write is rewritten for obfuscation.
///
/// `poll_write` gives the rewriter exclusive access, so the one-shot
/// `obfuscated` flag needs no further locking; the pending buffer makes
/// sure a rewritten payload is flushed completely before the call reports
/// completion, since the rewritten bytes are longer than the caller's.
pub struct SniClientStream {
    inner: BoxedStream,
    /// Original target, for logging
    addr: String,
    /// Decoy host
    host: String,
    obfuscated: bool,
    pending: Vec<u8>,
    pending_pos: usize,
}

impl SniClientStream {
    /// Rewrite the first payload per its leading byte.
    fn obfuscate(&self, payload: &[u8]) -> io::Result<Vec<u8>> {
        if payload.first() == Some(&CONTENT_TYPE_HANDSHAKE) {
            let (rewritten, host) = rewrite_client_hello_record(payload, &self.host, Side::Client)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            debug!(addr = %self.addr, decoy = %host, "obfuscated ClientHello");
            return Ok(rewritten);
        }
        Ok(self.obfuscate_http(payload))
    }

    /// Swap the `Host` header for the decoy and append the encoded
    /// original in a `Gost-Target` header; the rest of the payload is
    /// passed through untouched.
    fn obfuscate_http(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 64);
        let mut rest = payload;

        loop {
            let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
                out.extend_from_slice(rest);
                break;
            };
            let (line, after) = rest.split_at(nl + 1);

            // end of the header block
            if line == b"\r\n" {
                out.extend_from_slice(line);
                out.extend_from_slice(after);
                break;
            }

            if line.starts_with(b"Host") {
                let value = line.strip_prefix(b"Host:").unwrap_or(line);
                let original = String::from_utf8_lossy(value).trim().to_string();
                let encoded = encode_server_name(&original);
                debug!(addr = %self.addr, original = %original, decoy = %self.host, "obfuscated Host header");

                out.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
                out.extend_from_slice(format!("Gost-Target: {encoded}\r\n").as_bytes());
                out.extend_from_slice(after);
                break;
            }

            out.extend_from_slice(line);
            rest = after;
        }
        out
    }

    fn poll_drain_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.pending_pos < self.pending.len() {
            let n = match Pin::new(&mut self.inner)
                .poll_write(cx, &self.pending[self.pending_pos..])
            {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write returned zero",
                    )))
                }
                Poll::Ready(Ok(n)) => n,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            };
            self.pending_pos += n;
        }
        self.pending.clear();
        self.pending_pos = 0;
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for SniClientStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SniClientStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;

        // No decoy configured, or already past the first payload.
        if this.host.is_empty() || (this.obfuscated && this.pending.is_empty()) {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }

        if !this.obfuscated {
            this.pending = this.obfuscate(buf)?;
            this.pending_pos = 0;
            this.obfuscated = true;
        }

        match this.poll_drain_pending(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(buf.len())),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
