//! Nameserver dialing and query exchange
//!
//! The resolver separates *dialing* a nameserver from *exchanging* queries
//! on the established connection: the server list is walked until one
//! endpoint can be dialed, and that endpoint then serves every query of the
//! lookup. UDP and TCP use plain sockets; TLS wraps TCP with rustls,
//! verifying against the configured hostname or skipping verification when
//! no hostname is set.

use std::net::IpAddr;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, Error as RustlsError, SignatureScheme};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::TlsConnector;

use super::nameserver::{NameServer, NameServerProtocol};
use crate::error::ResolveError;

/// Largest answer we accept over UDP without truncation handling.
const MAX_UDP_ANSWER: usize = 4096;

/// An established connection to one nameserver.
pub(crate) enum DnsConn {
    Udp(UdpSocket),
    Stream(Box<dyn StreamConn>),
}

pub(crate) trait StreamConn: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> StreamConn for T {}

/// Dial `ns` per its protocol. For UDP this binds and connects a socket;
/// for TCP and TLS it completes the stream (and handshake) so a returned
/// connection is genuinely usable.
pub(crate) async fn dial(ns: &NameServer) -> Result<DnsConn, ResolveError> {
    let addr = ns.dial_addr();
    match ns.protocol {
        NameServerProtocol::Udp => {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(&addr).await?;
            Ok(DnsConn::Udp(socket))
        }
        NameServerProtocol::Tcp => {
            let stream = TcpStream::connect(&addr).await?;
            stream.set_nodelay(true).ok();
            Ok(DnsConn::Stream(Box::new(stream)))
        }
        NameServerProtocol::Tls => {
            let stream = TcpStream::connect(&addr).await?;
            stream.set_nodelay(true).ok();

            let skip_verify = ns.hostname.is_empty();
            let config = tls_client_config(skip_verify);
            // With verification disabled the server name is only used for
            // SNI; fall back to the dialed host.
            let sni = if skip_verify {
                ns.host().to_string()
            } else {
                ns.hostname.clone()
            };
            let server_name = ServerName::try_from(sni)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

            let connector = TlsConnector::from(config);
            let tls = connector.connect(server_name, stream).await?;
            Ok(DnsConn::Stream(Box::new(tls)))
        }
    }
}

/// Exchange `query` on an established connection and return the response.
pub(crate) async fn exchange(
    conn: &mut DnsConn,
    server: &NameServer,
    query: &Message,
) -> Result<Message, ResolveError> {
    let bytes = query.to_vec()?;
    let response = match conn {
        DnsConn::Udp(socket) => {
            socket.send(&bytes).await?;
            let mut buf = vec![0u8; MAX_UDP_ANSWER];
            let n = socket.recv(&mut buf).await?;
            Message::from_vec(&buf[..n])?
        }
        DnsConn::Stream(stream) => {
            // RFC 1035 framing: two-byte big-endian length prefix.
            let len = u16::try_from(bytes.len()).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "query too large")
            })?;
            stream.write_all(&len.to_be_bytes()).await?;
            stream.write_all(&bytes).await?;
            stream.flush().await?;

            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
            stream.read_exact(&mut buf).await?;
            Message::from_vec(&buf)?
        }
    };

    if response.id() != query.id() {
        return Err(ResolveError::IdMismatch {
            server: server.to_string(),
        });
    }
    Ok(response)
}

/// Build a recursive query for `name` with the given record type.
pub(crate) fn build_query(name: &str, rtype: RecordType) -> Result<Message, ResolveError> {
    let mut qname = Name::from_utf8(name)?;
    qname.set_fqdn(true);

    let mut message = Message::new();
    message.set_id(rand::random());
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(qname, rtype));
    Ok(message)
}

/// Collect the A/AAAA addresses out of a response.
pub(crate) fn answer_ips(response: &Message) -> Vec<IpAddr> {
    response
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
            Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect()
}

fn tls_client_config(skip_verify: bool) -> Arc<ClientConfig> {
    let config = if skip_verify {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth()
    } else {
        let roots =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };
    Arc::new(config)
}

/// Certificate verifier that accepts anything. Installed only when a TLS
/// nameserver is configured without a verification hostname.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
