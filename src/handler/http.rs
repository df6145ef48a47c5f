//! HTTP proxy handler
//!
//! Serves the two request shapes a forward proxy sees: `CONNECT host:port`
//! tunnels, and plain requests carrying an absolute URI (or an origin-form
//! path plus a `Host` header). Basic proxy authentication is enforced when
//! credentials are configured.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::{Handler, HandlerOptions};
use crate::error::HandlerError;
use crate::io::{relay, BoxedStream};

/// Largest accepted request head.
const MAX_HEAD: usize = 64 * 1024;

/// HTTP proxy server handler.
pub struct HttpHandler {
    options: Arc<HandlerOptions>,
}

impl HttpHandler {
    pub fn new(options: Arc<HandlerOptions>) -> Self {
        Self { options }
    }

    /// Check `Proxy-Authorization: Basic` against the configured users.
    fn authenticated(&self, request: &Request) -> bool {
        if self.options.users.is_empty() {
            return true;
        }
        let Some(value) = request.header("proxy-authorization") else {
            return false;
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, pass)) => self.options.check_credentials(user, pass),
            None => false,
        }
    }
}

#[async_trait]
impl Handler for HttpHandler {
    async fn handle(&self, mut stream: BoxedStream, peer: SocketAddr) -> Result<(), HandlerError> {
        let (head, body_prefix) = read_head(&mut stream).await?;
        let request = Request::parse(&head)?;

        debug!(%peer, method = %request.method, target = %request.target, "http request");

        if !self.authenticated(&request) {
            stream
                .write_all(
                    b"HTTP/1.1 407 Proxy Authentication Required\r\n\
                      Proxy-Authenticate: Basic realm=\"proxy-gateway\"\r\n\
                      Content-Length: 0\r\n\r\n",
                )
                .await?;
            return Err(HandlerError::Unauthorized);
        }

        let connect = request.method.eq_ignore_ascii_case("CONNECT");
        let target = request.connect_target()?;

        if !self.options.authorized(&target) {
            stream
                .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
                .await?;
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
                stream
                    .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n")
                    .await?;
                return Err(e.into());
            }
        };

        if connect {
            stream
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await?;
        } else {
            // Re-emit the request in origin form, dropping proxy headers.
            upstream.write_all(&request.origin_form_head()).await?;
        }
        if !body_prefix.is_empty() {
            upstream.write_all(&body_prefix).await?;
        }

        info!(%peer, target = %target, "http relay open");
        let result = relay(&mut stream, &mut upstream).await?;
        info!(
            %peer,
            target = %target,
            sent = result.client_to_upstream,
            received = result.upstream_to_client,
            "http relay closed"
        );
        Ok(())
    }
}

/// A parsed request head.
struct Request {
    method: String,
    target: String,
    version: String,
    headers: Vec<(String, String)>,
}

impl Request {
    fn parse(head: &[u8]) -> Result<Self, HandlerError> {
        let text = std::str::from_utf8(head)
            .map_err(|_| HandlerError::Protocol("non-UTF-8 request head"))?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) if !m.is_empty() && !t.is_empty() => {
                (m.to_string(), t.to_string(), v.to_string())
            }
            _ => return Err(HandlerError::Protocol("malformed request line")),
        };

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(HandlerError::Protocol("malformed header line"));
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
        Ok(Self {
            method,
            target,
            version,
            headers,
        })
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The dialable `host:port` this request points at.
    fn connect_target(&self) -> Result<String, HandlerError> {
        if self.method.eq_ignore_ascii_case("CONNECT") {
            // authority form, port required by the grammar but defaulted anyway
            return Ok(if self.target.contains(':') {
                self.target.clone()
            } else {
                format!("{}:443", self.target)
            });
        }

        let authority = if let Some(rest) = self.target.strip_prefix("http://") {
            rest.split('/').next().unwrap_or_default().to_string()
        } else if self.target.starts_with('/') {
            self.header("host")
                .map(str::to_string)
                .ok_or(HandlerError::Protocol("origin-form request without Host"))?
        } else {
            return Err(HandlerError::Protocol("unsupported request target"));
        };
        if authority.is_empty() {
            return Err(HandlerError::Protocol("empty request authority"));
        }
        Ok(if authority.contains(':') {
            authority
        } else {
            format!("{authority}:80")
        })
    }

    /// Rebuild the head in origin form for the upstream server, dropping
    /// hop-by-hop proxy headers.
    fn origin_form_head(&self) -> Vec<u8> {
        let path = self
            .target
            .strip_prefix("http://")
            .and_then(|rest| rest.find('/').map(|i| &rest[i..]))
            .unwrap_or(if self.target.starts_with('/') {
                &self.target
            } else {
                "/"
            });

        let mut head = format!("{} {} {}\r\n", self.method, path, self.version);
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("proxy-authorization")
                || name.eq_ignore_ascii_case("proxy-connection")
            {
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

/// Read until the end of the request head. Returns the head including the
/// final CRLFCRLF and any body bytes that arrived with it.
async fn read_head(stream: &mut BoxedStream) -> Result<(Vec<u8>, Vec<u8>), HandlerError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = find_head_end(&buf) {
            let rest = buf.split_off(end);
            return Ok((buf, rest));
        }
        if buf.len() > MAX_HEAD {
            return Err(HandlerError::Protocol("request head too large"));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandlerError::EarlyEof);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}
