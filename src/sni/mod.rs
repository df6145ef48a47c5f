//! SNI sniffing, rewriting and obfuscation
//!
//! The server side ([`SniHandler`]) peeks the TLS record header, recovers
//! the intended hostname from the ClientHello (preferring an obfuscated
//! name carried in the private-use `0xFFFE` extension), restores the
//! `server_name` extension and forwards the rebuilt record upstream.
//!
//! The client side ([`SniConnector`] / [`SniClientStream`]) does the
//! inverse on the first outgoing payload: it hides the real hostname in a
//! `0xFFFE` extension and presents a decoy in `server_name`, or rewrites
//! the `Host` header for plaintext HTTP.

pub mod clienthello;
pub mod connector;
pub mod handler;
pub mod obfs;

pub use clienthello::{ClientHello, Extension};
pub use connector::{SniClientStream, SniConnector};
pub use handler::SniHandler;
pub use obfs::{decode_server_name, encode_server_name};

use clienthello::{
    CONTENT_TYPE_HANDSHAKE, EXT_OBFUSCATED_NAME, MAX_FRAGMENT_LEN, RECORD_HEADER_LEN,
};
use tracing::debug;

use crate::error::SniError;

/// Which end of the obfuscation scheme is rewriting the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    /// Recover the original name and strip the obfuscation extension
    Server,
    /// Hide the original name and present the decoy
    Client,
}

/// Rewrite one ClientHello record.
///
/// For [`Side::Server`], `host` is ignored: any valid `0xFFFE` extension
/// yields the effective hostname and is removed (invalid ones are kept and
/// ignored); otherwise the `server_name` value is used, and the extension
/// is rewritten to the recovered name.
///
/// For [`Side::Client`], `host` is the decoy: the original `server_name`
/// is re-encoded into an appended `0xFFFE` extension and the `server_name`
/// extension is overwritten with the decoy.
///
/// Returns the re-encoded record and the effective hostname.
pub(crate) fn rewrite_client_hello_record(
    record: &[u8],
    host: &str,
    side: Side,
) -> Result<(Vec<u8>, String), SniError> {
    if record.len() < RECORD_HEADER_LEN {
        return Err(SniError::ShortRecord);
    }
    if record[0] != CONTENT_TYPE_HANDSHAKE {
        return Err(SniError::Malformed("not a handshake record"));
    }
    let record_version = u16::from_be_bytes([record[1], record[2]]);
    let frag_len = usize::from(u16::from_be_bytes([record[3], record[4]]));
    if frag_len == 0 || frag_len > MAX_FRAGMENT_LEN {
        return Err(SniError::RecordLength(frag_len));
    }
    if record.len() < RECORD_HEADER_LEN + frag_len {
        return Err(SniError::ShortRecord);
    }

    let mut hello = ClientHello::decode(&record[RECORD_HEADER_LEN..RECORD_HEADER_LEN + frag_len])?;
    let mut host = host.to_string();

    if side == Side::Server {
        hello.extensions.retain(|ext| {
            if ext.typ != EXT_OBFUSCATED_NAME {
                return true;
            }
            let Ok(text) = std::str::from_utf8(&ext.data) else {
                return true;
            };
            match obfs::decode_server_name(text) {
                Ok(name) => {
                    debug!(host = %name, "recovered obfuscated server name");
                    host = name;
                    false
                }
                // Not ours (or tampered with): leave it alone and fall
                // through to standard SNI handling.
                Err(_) => true,
            }
        });
    }

    if let Some(name) = hello.server_name() {
        if host.is_empty() {
            host = name.clone();
        }
        if side == Side::Client {
            hello.extensions.push(Extension::new(
                EXT_OBFUSCATED_NAME,
                obfs::encode_server_name(&name).into_bytes(),
            ));
        }
        if !host.is_empty() {
            hello.set_server_name(&host);
        }
    }

    Ok((hello.into_record(record_version), host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_with_sni(sni: &str) -> ClientHello {
        let mut hello = ClientHello {
            version: 0x0303,
            random: [9u8; 32],
            session_id: vec![0xAA; 8],
            cipher_suites: vec![0x13, 0x01],
            compression_methods: vec![0x00],
            extensions: Vec::new(),
        };
        hello.set_server_name(sni);
        hello
    }

    #[test]
    fn test_client_rewrite_presents_decoy() {
        let record = hello_with_sni("real.example").into_record(0x0301);
        let (rewritten, host) =
            rewrite_client_hello_record(&record, "decoy.example", Side::Client).unwrap();
        assert_eq!(host, "decoy.example");

        let hello = ClientHello::decode(&rewritten[RECORD_HEADER_LEN..]).unwrap();
        assert_eq!(hello.server_name().as_deref(), Some("decoy.example"));

        let obfuscated = hello
            .extensions
            .iter()
            .find(|e| e.typ == EXT_OBFUSCATED_NAME)
            .expect("obfuscation extension present");
        let decoded =
            decode_server_name(std::str::from_utf8(&obfuscated.data).unwrap()).unwrap();
        assert_eq!(decoded, "real.example");
    }

    #[test]
    fn test_server_recovers_original_name() {
        let record = hello_with_sni("real.example").into_record(0x0301);
        let (client_side, _) =
            rewrite_client_hello_record(&record, "decoy.example", Side::Client).unwrap();

        let (server_side, host) =
            rewrite_client_hello_record(&client_side, "", Side::Server).unwrap();
        assert_eq!(host, "real.example");

        let hello = ClientHello::decode(&server_side[RECORD_HEADER_LEN..]).unwrap();
        assert_eq!(hello.server_name().as_deref(), Some("real.example"));
        assert!(!hello
            .extensions
            .iter()
            .any(|e| e.typ == EXT_OBFUSCATED_NAME));
    }

    #[test]
    fn test_server_plain_sni_passthrough() {
        let record = hello_with_sni("plain.example").into_record(0x0303);
        let (rewritten, host) = rewrite_client_hello_record(&record, "", Side::Server).unwrap();
        assert_eq!(host, "plain.example");

        let hello = ClientHello::decode(&rewritten[RECORD_HEADER_LEN..]).unwrap();
        assert_eq!(hello.server_name().as_deref(), Some("plain.example"));
    }

    #[test]
    fn test_server_ignores_invalid_obfuscation_extension() {
        let mut hello = hello_with_sni("fallback.example");
        hello.extensions.push(Extension::new(
            EXT_OBFUSCATED_NAME,
            b"garbage that is not a valid name".to_vec(),
        ));
        let record = hello.into_record(0x0301);

        let (rewritten, host) = rewrite_client_hello_record(&record, "", Side::Server).unwrap();
        // Falls through to standard SNI handling
        assert_eq!(host, "fallback.example");

        // The unrecognized extension is left in place
        let parsed = ClientHello::decode(&rewritten[RECORD_HEADER_LEN..]).unwrap();
        assert!(parsed
            .extensions
            .iter()
            .any(|e| e.typ == EXT_OBFUSCATED_NAME));
    }

    #[test]
    fn test_rewrite_preserves_record_version() {
        let record = hello_with_sni("x.example").into_record(0x0302);
        let (rewritten, _) = rewrite_client_hello_record(&record, "", Side::Server).unwrap();
        assert_eq!(u16::from_be_bytes([rewritten[1], rewritten[2]]), 0x0302);
    }

    #[test]
    fn test_rewrite_rejects_short_and_wrong_type() {
        assert!(matches!(
            rewrite_client_hello_record(&[0x16, 0x03], "", Side::Server),
            Err(SniError::ShortRecord)
        ));
        let mut record = hello_with_sni("x").into_record(0x0301);
        record[0] = 0x17;
        assert!(rewrite_client_hello_record(&record, "", Side::Server).is_err());
    }
}
