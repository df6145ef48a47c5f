//! I/O utilities
//!
//! - [`BufferedStream`]: a connection wrapper that replays already-peeked
//!   bytes in front of the socket, so protocol sniffing never consumes
//!   data the downstream handler needs.
//! - [`relay`]: the bidirectional byte pump used once a connection is
//!   matched to its upstream.

pub mod buffer;
pub mod copy;

pub use buffer::BufferedStream;
pub use copy::{relay, relay_with_buffer, RelayResult};

use tokio::io::{AsyncRead, AsyncWrite};

/// Object-safe alias for anything that can carry a proxied connection.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawStream for T {}

/// A boxed connection stream as handed between handlers.
pub type BoxedStream = Box<dyn RawStream>;

/// Default relay buffer size per direction.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
