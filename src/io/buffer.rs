//! Peeked-byte preserving stream wrapper
//!
//! Protocol dispatch has to look at the first bytes of a connection before
//! knowing who should handle it. [`BufferedStream`] owns a small replay
//! buffer in front of the socket: reads drain the buffer first and then
//! fall through to the underlying stream, while writes, flush and shutdown
//! pass straight through. The downstream handler therefore sees the stream
//! from byte zero.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A stream with a replayed prefix.
#[derive(Debug)]
pub struct BufferedStream<S> {
    prefix: Vec<u8>,
    pos: usize,
    inner: S,
}

impl<S> BufferedStream<S> {
    /// Wrap `inner` with no replayed bytes.
    pub fn new(inner: S) -> Self {
        Self::with_prefix(Vec::new(), inner)
    }

    /// Wrap `inner` so that `prefix` is read back before any socket data.
    pub fn with_prefix(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix,
            pos: 0,
            inner,
        }
    }

    /// Bytes still waiting to be replayed.
    pub fn buffered(&self) -> &[u8] {
        &self.prefix[self.pos..]
    }

    /// Consume the wrapper, returning the inner stream.
    ///
    /// Any unreplayed bytes are lost; callers should drain first.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for BufferedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.pos < this.prefix.len() {
            let remaining = &this.prefix[this.pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for BufferedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
