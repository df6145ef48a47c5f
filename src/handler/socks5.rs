//! SOCKS5 CONNECT handler
//!
//! Implements the server side of RFC 1928 for the CONNECT command, with
//! USERNAME/PASSWORD authentication (RFC 1929) whenever credentials are
//! configured. BIND and UDP ASSOCIATE are answered with `command not
//! supported`.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::{Handler, HandlerOptions};
use crate::error::HandlerError;
use crate::io::{relay, BoxedStream};

pub const VERSION: u8 = 0x05;

pub const AUTH_NONE: u8 = 0x00;
pub const AUTH_USERPASS: u8 = 0x02;
pub const AUTH_NO_ACCEPT: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

pub const REP_SUCCESS: u8 = 0x00;
pub const REP_NOT_ALLOWED: u8 = 0x02;
pub const REP_HOST_UNREACH: u8 = 0x04;
pub const REP_CMD_NOT_SUPPORTED: u8 = 0x07;

/// SOCKS5 server handler (CONNECT only).
pub struct Socks5Handler {
    options: Arc<HandlerOptions>,
}

impl Socks5Handler {
    pub fn new(options: Arc<HandlerOptions>) -> Self {
        Self { options }
    }

    /// Method negotiation plus the optional RFC 1929 subnegotiation.
    async fn negotiate(&self, stream: &mut BoxedStream) -> Result<(), HandlerError> {
        let mut head = [0u8; 2];
        stream.read_exact(&mut head).await?;
        if head[0] != VERSION {
            return Err(HandlerError::Protocol("bad SOCKS version"));
        }
        let mut methods = vec![0u8; usize::from(head[1])];
        stream.read_exact(&mut methods).await?;

        let wanted = if self.options.users.is_empty() {
            AUTH_NONE
        } else {
            AUTH_USERPASS
        };
        let chosen = if methods.contains(&wanted) {
            wanted
        } else {
            AUTH_NO_ACCEPT
        };
        stream.write_all(&[VERSION, chosen]).await?;
        if chosen == AUTH_NO_ACCEPT {
            return Err(HandlerError::Protocol("no acceptable auth method"));
        }

        if chosen == AUTH_USERPASS {
            let mut sub = [0u8; 2];
            stream.read_exact(&mut sub).await?;
            if sub[0] != 0x01 {
                return Err(HandlerError::Protocol("bad auth subnegotiation version"));
            }
            let mut username = vec![0u8; usize::from(sub[1])];
            stream.read_exact(&mut username).await?;
            let mut plen = [0u8; 1];
            stream.read_exact(&mut plen).await?;
            let mut password = vec![0u8; usize::from(plen[0])];
            stream.read_exact(&mut password).await?;

            let username = String::from_utf8_lossy(&username);
            let password = String::from_utf8_lossy(&password);
            if self.options.check_credentials(&username, &password) {
                stream.write_all(&[0x01, 0x00]).await?;
            } else {
                stream.write_all(&[0x01, 0x01]).await?;
                return Err(HandlerError::Unauthorized);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Handler for Socks5Handler {
    async fn handle(&self, mut stream: BoxedStream, peer: SocketAddr) -> Result<(), HandlerError> {
        self.negotiate(&mut stream).await?;

        let mut request = [0u8; 4];
        stream.read_exact(&mut request).await?;
        if request[0] != VERSION {
            return Err(HandlerError::Protocol("bad SOCKS version in request"));
        }
        let target = read_address(&mut stream, request[3]).await?;

        if request[1] != CMD_CONNECT {
            write_reply(&mut stream, REP_CMD_NOT_SUPPORTED).await?;
            return Err(HandlerError::Protocol("unsupported SOCKS command"));
        }

        debug!(%peer, target = %target, "socks5 connect");

        if !self.options.authorized(&target) {
            write_reply(&mut stream, REP_NOT_ALLOWED).await?;
            return Ok(());
        }
        if self.options.bypassed(&target) {
            return Ok(());
        }

        let mut upstream = match self
            .options
            .chain
            .dial(&target, &self.options.dial_options())
            .await
        {
            Ok(upstream) => upstream,
            Err(e) => {
                write_reply(&mut stream, REP_HOST_UNREACH).await?;
                return Err(e.into());
            }
        };
        write_reply(&mut stream, REP_SUCCESS).await?;

        info!(%peer, target = %target, "socks5 relay open");
        let result = relay(&mut stream, &mut upstream).await?;
        info!(
            %peer,
            target = %target,
            sent = result.client_to_upstream,
            received = result.upstream_to_client,
            "socks5 relay closed"
        );
        Ok(())
    }
}

/// Read a SOCKS5 address of the given type plus the port, returning the
/// dialable `host:port` form.
pub(crate) async fn read_address<S: AsyncRead + Unpin>(
    stream: &mut S,
    atyp: u8,
) -> Result<String, HandlerError> {
    let host = match atyp {
        ATYP_IPV4 => {
            let mut ip = [0u8; 4];
            stream.read_exact(&mut ip).await?;
            Ipv4Addr::from(ip).to_string()
        }
        ATYP_IPV6 => {
            let mut ip = [0u8; 16];
            stream.read_exact(&mut ip).await?;
            format!("[{}]", Ipv6Addr::from(ip))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut name = vec![0u8; usize::from(len[0])];
            stream.read_exact(&mut name).await?;
            String::from_utf8(name)
                .map_err(|_| HandlerError::Protocol("non-UTF-8 domain name"))?
        }
        _ => return Err(HandlerError::Protocol("unsupported address type")),
    };
    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    Ok(format!("{host}:{}", u16::from_be_bytes(port)))
}

async fn write_reply(stream: &mut BoxedStream, code: u8) -> Result<(), HandlerError> {
    stream
        .write_all(&[VERSION, code, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await?;
    Ok(())
}
