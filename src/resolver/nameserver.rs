//! Nameserver records
//!
//! A [`NameServer`] names one upstream DNS endpoint: an address with an
//! optional port (53 by default), a transport protocol and, for TLS, the
//! hostname presented for certificate verification. An empty TLS hostname
//! disables verification; that is an explicit escape hatch for servers
//! addressed by IP with no stable certificate name.

use std::fmt;

use crate::policy::split_host_port;

/// Transport used to reach a nameserver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameServerProtocol {
    #[default]
    Udp,
    Tcp,
    Tls,
}

impl NameServerProtocol {
    /// Parse a protocol field; unknown values fall back to UDP.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Self::Tcp,
            "tls" => Self::Tls,
            _ => Self::Udp,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
        }
    }
}

/// One upstream DNS endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameServer {
    /// `host` or `host:port`; the port defaults to 53
    pub addr: String,
    pub protocol: NameServerProtocol,
    /// TLS verification name; empty skips verification
    pub hostname: String,
}

impl NameServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            protocol: NameServerProtocol::default(),
            hostname: String::new(),
        }
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: NameServerProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// The dialable `host:port` form, with the default port applied.
    pub(crate) fn dial_addr(&self) -> String {
        if split_host_port(&self.addr).is_some() {
            self.addr.clone()
        } else {
            format!("{}:53", self.addr)
        }
    }

    /// The host part of the address, without any port.
    pub(crate) fn host(&self) -> &str {
        match split_host_port(&self.addr) {
            Some((host, _)) => host,
            None => &self.addr,
        }
    }
}

impl fmt::Display for NameServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}",
            self.dial_addr(),
            self.protocol.as_str(),
            self.hostname
        )
    }
}
