//! SOCKS4/4a CONNECT handler
//!
//! SOCKS4 has no authentication, so the dispatcher refuses to route here
//! when credentials are configured; this handler only ever runs for open
//! gateways. The 4a extension (destination 0.0.0.x with a trailing domain
//! name) is supported.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::{Handler, HandlerOptions};
use crate::error::HandlerError;
use crate::io::{relay, BoxedStream};

pub const VERSION: u8 = 0x04;
pub const CMD_CONNECT: u8 = 0x01;

pub const REP_GRANTED: u8 = 0x5A;
pub const REP_REJECTED: u8 = 0x5B;

/// SOCKS4 server handler (CONNECT only).
pub struct Socks4Handler {
    options: Arc<HandlerOptions>,
}

impl Socks4Handler {
    pub fn new(options: Arc<HandlerOptions>) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Handler for Socks4Handler {
    async fn handle(&self, mut stream: BoxedStream, peer: SocketAddr) -> Result<(), HandlerError> {
        let mut head = [0u8; 8];
        stream.read_exact(&mut head).await?;
        if head[0] != VERSION {
            return Err(HandlerError::Protocol("bad SOCKS version"));
        }
        let command = head[1];
        let port = u16::from_be_bytes([head[2], head[3]]);
        let ip = Ipv4Addr::new(head[4], head[5], head[6], head[7]);

        // userid, unused beyond framing
        read_zstring(&mut stream).await?;

        // SOCKS4a: 0.0.0.x (x != 0) means a domain name follows
        let octets = ip.octets();
        let host = if octets[0] == 0 && octets[1] == 0 && octets[2] == 0 && octets[3] != 0 {
            read_zstring(&mut stream).await?
        } else {
            ip.to_string()
        };
        let target = format!("{host}:{port}");

        if command != CMD_CONNECT {
            write_reply(&mut stream, REP_REJECTED).await?;
            return Err(HandlerError::Protocol("unsupported SOCKS4 command"));
        }

        debug!(%peer, target = %target, "socks4 connect");

        if !self.options.authorized(&target) {
            write_reply(&mut stream, REP_REJECTED).await?;
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
                write_reply(&mut stream, REP_REJECTED).await?;
                return Err(e.into());
            }
        };
        write_reply(&mut stream, REP_GRANTED).await?;

        info!(%peer, target = %target, "socks4 relay open");
        let result = relay(&mut stream, &mut upstream).await?;
        info!(
            %peer,
            target = %target,
            sent = result.client_to_upstream,
            received = result.upstream_to_client,
            "socks4 relay closed"
        );
        Ok(())
    }
}

/// Read a NUL-terminated string, as used for the SOCKS4 userid and the
/// SOCKS4a hostname.
async fn read_zstring<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String, HandlerError> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await?;
        if byte[0] == 0 {
            break;
        }
        if bytes.len() >= 255 {
            return Err(HandlerError::Protocol("SOCKS4 string too long"));
        }
        bytes.push(byte[0]);
    }
    String::from_utf8(bytes).map_err(|_| HandlerError::Protocol("non-UTF-8 SOCKS4 string"))
}

async fn write_reply(stream: &mut BoxedStream, code: u8) -> Result<(), HandlerError> {
    stream.write_all(&[0x00, code, 0, 0, 0, 0, 0, 0]).await?;
    Ok(())
}
