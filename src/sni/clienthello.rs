//! TLS ClientHello codec
//!
//! A decode/re-encode pass over the first handshake record, precise enough
//! to read and rewrite extensions while leaving every other field intact.
//! Only the pieces the SNI layer needs are modeled; unknown extensions are
//! carried through opaquely.
//!
//! Record layer: `content_type(1) | version(2) | length(2) | fragment`.
//! The fragment holds one handshake message whose body is the ClientHello:
//! version, random, session id, cipher suites, compression methods and the
//! extensions vector.

use crate::error::SniError;

/// TLS record content type for handshake messages.
pub const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;

/// TLS record header length.
pub const RECORD_HEADER_LEN: usize = 5;

/// Handshake message type for ClientHello.
pub const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

/// RFC 5246 bound on a record fragment.
pub const MAX_FRAGMENT_LEN: usize = 16384;

/// The `server_name` extension type.
pub const EXT_SERVER_NAME: u16 = 0x0000;

/// Private-use extension type carrying the obfuscated original SNI.
pub const EXT_OBFUSCATED_NAME: u16 = 0xFFFE;

/// One raw extension: type plus opaque data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub typ: u16,
    pub data: Vec<u8>,
}

impl Extension {
    pub fn new(typ: u16, data: Vec<u8>) -> Self {
        Self { typ, data }
    }
}

/// A decoded ClientHello, re-encodable after extension edits.
#[derive(Debug, Clone)]
pub struct ClientHello {
    pub version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    /// Raw cipher-suite vector contents (length re-derived on encode)
    pub cipher_suites: Vec<u8>,
    /// Raw compression-method vector contents
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

/// A cursor over the handshake body with bounds-checked reads.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], SniError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(SniError::Malformed(what))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, SniError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, SniError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl ClientHello {
    /// Decode the handshake message carried in a record fragment.
    pub fn decode(fragment: &[u8]) -> Result<Self, SniError> {
        let mut r = Reader::new(fragment);

        if r.u8("handshake type")? != HANDSHAKE_CLIENT_HELLO {
            return Err(SniError::Malformed("not a ClientHello"));
        }
        let len_bytes = r.take(3, "handshake length")?;
        let body_len =
            (usize::from(len_bytes[0]) << 16) | (usize::from(len_bytes[1]) << 8) | usize::from(len_bytes[2]);
        if body_len > r.remaining() {
            return Err(SniError::Malformed("handshake length exceeds fragment"));
        }

        let version = r.u16("protocol version")?;
        let mut random = [0u8; 32];
        random.copy_from_slice(r.take(32, "random")?);

        let sid_len = usize::from(r.u8("session id length")?);
        let session_id = r.take(sid_len, "session id")?.to_vec();

        let cs_len = usize::from(r.u16("cipher suites length")?);
        let cipher_suites = r.take(cs_len, "cipher suites")?.to_vec();

        let cm_len = usize::from(r.u8("compression methods length")?);
        let compression_methods = r.take(cm_len, "compression methods")?.to_vec();

        let mut extensions = Vec::new();
        if r.remaining() >= 2 {
            let ext_total = usize::from(r.u16("extensions length")?);
            let mut ext = Reader::new(r.take(ext_total, "extensions")?);
            while ext.remaining() >= 4 {
                let typ = ext.u16("extension type")?;
                let len = usize::from(ext.u16("extension length")?);
                extensions.push(Extension::new(typ, ext.take(len, "extension data")?.to_vec()));
            }
            if ext.remaining() != 0 {
                return Err(SniError::Malformed("trailing extension bytes"));
            }
        }

        Ok(Self {
            version,
            random,
            session_id,
            cipher_suites,
            compression_methods,
            extensions,
        })
    }

    /// Encode back into a handshake message (type + length + body).
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(128);
        body.extend_from_slice(&self.version.to_be_bytes());
        body.extend_from_slice(&self.random);
        body.push(self.session_id.len() as u8);
        body.extend_from_slice(&self.session_id);
        body.extend_from_slice(&(self.cipher_suites.len() as u16).to_be_bytes());
        body.extend_from_slice(&self.cipher_suites);
        body.push(self.compression_methods.len() as u8);
        body.extend_from_slice(&self.compression_methods);

        if !self.extensions.is_empty() {
            let ext_total: usize = self.extensions.iter().map(|e| 4 + e.data.len()).sum();
            body.extend_from_slice(&(ext_total as u16).to_be_bytes());
            for ext in &self.extensions {
                body.extend_from_slice(&ext.typ.to_be_bytes());
                body.extend_from_slice(&(ext.data.len() as u16).to_be_bytes());
                body.extend_from_slice(&ext.data);
            }
        }

        let mut out = Vec::with_capacity(4 + body.len());
        out.push(HANDSHAKE_CLIENT_HELLO);
        out.extend_from_slice(&[
            (body.len() >> 16) as u8,
            (body.len() >> 8) as u8,
            body.len() as u8,
        ]);
        out.extend_from_slice(&body);
        out
    }

    /// Wrap the encoded hello in a TLS record with the given record-layer
    /// version.
    pub fn into_record(&self, record_version: u16) -> Vec<u8> {
        let fragment = self.encode();
        let mut out = Vec::with_capacity(RECORD_HEADER_LEN + fragment.len());
        out.push(CONTENT_TYPE_HANDSHAKE);
        out.extend_from_slice(&record_version.to_be_bytes());
        out.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
        out.extend_from_slice(&fragment);
        out
    }

    /// The hostname in the `server_name` extension, if present.
    pub fn server_name(&self) -> Option<String> {
        let ext = self.extensions.iter().find(|e| e.typ == EXT_SERVER_NAME)?;
        parse_server_name_data(&ext.data)
    }

    /// Rewrite (or install) the `server_name` extension to carry `name`.
    pub fn set_server_name(&mut self, name: &str) {
        let data = encode_server_name_data(name);
        match self
            .extensions
            .iter_mut()
            .find(|e| e.typ == EXT_SERVER_NAME)
        {
            Some(ext) => ext.data = data,
            None => self.extensions.push(Extension::new(EXT_SERVER_NAME, data)),
        }
    }
}

/// Parse a `server_name` extension body: name list with `host_name`
/// entries.
fn parse_server_name_data(data: &[u8]) -> Option<String> {
    if data.len() < 2 {
        return None;
    }
    let list_len = usize::from(u16::from_be_bytes([data[0], data[1]]));
    let mut pos = 2;
    let end = (2 + list_len).min(data.len());
    while pos + 3 <= end {
        let name_type = data[pos];
        let name_len = usize::from(u16::from_be_bytes([data[pos + 1], data[pos + 2]]));
        pos += 3;
        if pos + name_len > data.len() {
            return None;
        }
        if name_type == 0 {
            return String::from_utf8(data[pos..pos + name_len].to_vec()).ok();
        }
        pos += name_len;
    }
    None
}

fn encode_server_name_data(name: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(5 + name.len());
    data.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
    data.push(0); // host_name
    data.extend_from_slice(&(name.len() as u16).to_be_bytes());
    data.extend_from_slice(name.as_bytes());
    data
}
