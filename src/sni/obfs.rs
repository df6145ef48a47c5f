//! Server-name obfuscation codec
//!
//! Encodes a hostname so it can ride in a private-use TLS extension past
//! SNI-based filters. The CRC32 prefix is an integrity check, not a
//! cryptographic one: it lets the server reject injected extensions
//! instead of mis-reading them as a target name.
//!
//! Layout: `base64url( crc32_be(name) || base64url(name) )`, both base64
//! passes unpadded.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::SniError;

/// Encode `name` into its obfuscated transport form.
pub fn encode_server_name(name: &str) -> String {
    let inner = URL_SAFE_NO_PAD.encode(name.as_bytes());
    let mut outer = Vec::with_capacity(4 + inner.len());
    outer.extend_from_slice(&crc32fast::hash(name.as_bytes()).to_be_bytes());
    outer.extend_from_slice(inner.as_bytes());
    URL_SAFE_NO_PAD.encode(outer)
}

/// Decode an obfuscated name, verifying the CRC32 prefix.
///
/// # Errors
///
/// Returns [`SniError::InvalidName`] for bad base64, a short payload, a
/// CRC mismatch or non-UTF-8 name bytes.
pub fn decode_server_name(s: &str) -> Result<String, SniError> {
    let outer = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| SniError::InvalidName)?;
    if outer.len() < 4 {
        return Err(SniError::InvalidName);
    }
    let expected = u32::from_be_bytes([outer[0], outer[1], outer[2], outer[3]]);
    let name_bytes = URL_SAFE_NO_PAD
        .decode(&outer[4..])
        .map_err(|_| SniError::InvalidName)?;
    if crc32fast::hash(&name_bytes) != expected {
        return Err(SniError::InvalidName);
    }
    String::from_utf8(name_bytes).map_err(|_| SniError::InvalidName)
}
