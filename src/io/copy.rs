//! Bidirectional byte relay
//!
//! Once a handler has matched a connection to its upstream, [`relay`]
//! splices the two streams until both directions end. EOF on one side
//! shuts down the write half of the other; an error on either side tears
//! the relay down. The per-direction byte counts come back for logging.

use std::io;

use tokio::io::{copy_bidirectional_with_sizes, AsyncRead, AsyncWrite};

use super::DEFAULT_BUFFER_SIZE;

/// Byte counts for one finished relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayResult {
    /// Bytes moved from the client side to the upstream side
    pub client_to_upstream: u64,
    /// Bytes moved from the upstream side to the client side
    pub upstream_to_client: u64,
}

impl RelayResult {
    /// Total bytes moved in both directions.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.client_to_upstream + self.upstream_to_client
    }
}

/// Relay bytes between `client` and `upstream` until both directions end.
pub async fn relay<A, B>(client: &mut A, upstream: &mut B) -> io::Result<RelayResult>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    relay_with_buffer(client, upstream, DEFAULT_BUFFER_SIZE).await
}

/// [`relay`] with an explicit per-direction buffer size.
pub async fn relay_with_buffer<A, B>(
    client: &mut A,
    upstream: &mut B,
    buf_size: usize,
) -> io::Result<RelayResult>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (client_to_upstream, upstream_to_client) =
        copy_bidirectional_with_sizes(client, upstream, buf_size, buf_size).await?;
    Ok(RelayResult {
        client_to_upstream,
        upstream_to_client,
    })
}
