//! Error types for proxy-gateway
//!
//! Errors are categorized by subsystem. Each subsystem has its own enum so
//! callers can match on the failures they care about; `GatewayError` folds
//! them together for code that spans subsystems.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Name resolution errors
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Node selection errors
    #[error("select error: {0}")]
    Select(#[from] SelectError),

    /// Upstream dialing errors
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// TLS ClientHello / SNI processing errors
    #[error("sni error: {0}")]
    Sni(#[from] SniError),

    /// Connection handling errors
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Name resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The lookup exceeded the resolver timeout
    #[error("resolution of {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// No configured nameserver could be dialed
    #[error("no nameserver reachable for {name}")]
    NoServer { name: String },

    /// DNS message encode/decode failure
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),

    /// The response id did not match the query id
    #[error("response id mismatch from {server}")]
    IdMismatch { server: String },

    /// Network failure while exchanging with a nameserver
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Node selection errors
#[derive(Debug, Error)]
pub enum SelectError {
    /// Every candidate was filtered out or the pool was empty
    #[error("none available")]
    NoneAvailable,
}

/// Upstream dialing errors
#[derive(Debug, Error)]
pub enum ChainError {
    /// Target address could not be resolved
    #[error("resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: ResolveError,
    },

    /// The target address has no usable form (no port, no addresses)
    #[error("invalid target address: {addr}")]
    InvalidAddr { addr: String },

    /// The dial exceeded the configured timeout
    #[error("dial {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    /// All dial attempts failed
    #[error("dial {addr} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

/// TLS ClientHello / SNI processing errors
#[derive(Debug, Error)]
pub enum SniError {
    /// Stream ended before a full record header or fragment arrived
    #[error("short TLS record")]
    ShortRecord,

    /// Record length outside the RFC 5246 bound
    #[error("TLS record length {0} out of range")]
    RecordLength(usize),

    /// The record fragment is not a well-formed ClientHello
    #[error("malformed ClientHello: {0}")]
    Malformed(&'static str),

    /// Obfuscated server name failed to decode (bad base64 or CRC mismatch)
    #[error("invalid name")]
    InvalidName,

    /// Network failure while reading or writing the record
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Connection handling errors
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Ingress ended before the protocol could be sniffed
    #[error("connection closed before protocol sniff")]
    EarlyEof,

    /// Malformed protocol preamble (SOCKS handshake, HTTP request line)
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// The client failed authentication
    #[error("authentication failed")]
    Unauthorized,

    /// Upstream dial failed
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// SNI processing failed
    #[error(transparent)]
    Sni(#[from] SniError),

    /// I/O failure on the ingress or egress socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_error_message() {
        assert_eq!(SelectError::NoneAvailable.to_string(), "none available");
    }

    #[test]
    fn test_invalid_name_message() {
        assert_eq!(SniError::InvalidName.to_string(), "invalid name");
    }

    #[test]
    fn test_gateway_error_from_io() {
        let err: GatewayError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, GatewayError::Io(_)));
    }

    #[test]
    fn test_chain_error_source_chain() {
        use std::error::Error as _;
        let err = ChainError::Exhausted {
            addr: "example.com:443".into(),
            attempts: 3,
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.source().is_some());
    }
}
