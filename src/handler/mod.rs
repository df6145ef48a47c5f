//! Connection handlers
//!
//! A [`Handler`] owns an accepted connection until it is closed. Handlers
//! are configured once through [`HandlerOptions`], an immutable snapshot
//! built before the accept loop starts; per-connection work only reads it.
//!
//! [`AutoHandler`] is the protocol dispatcher; the SOCKS4, SOCKS5 and HTTP
//! handlers implement the minimal CONNECT paths of their protocols and
//! share the policy / chain fabric via the options record.

pub mod auto;
pub mod http;
pub mod socks4;
pub mod socks5;

pub use auto::AutoHandler;
pub use http::HttpHandler;
pub use socks4::Socks4Handler;
pub use socks5::Socks5Handler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::chain::{Chain, DialOptions, DirectChain};
use crate::error::HandlerError;
use crate::io::BoxedStream;
use crate::policy::{can_access, Bypass, Hosts, Permissions};
use crate::resolver::Resolver;
use crate::select::{RoundStrategy, Strategy};

/// A proxy server handler: takes ownership of a connection until close.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, stream: BoxedStream, peer: SocketAddr) -> Result<(), HandlerError>;
}

/// One client credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse the `name:pass` form used on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        let (user, pass) = s.split_once(':')?;
        if user.is_empty() {
            return None;
        }
        Some(Self::new(user, pass))
    }
}

/// Shared immutable configuration consumed by handlers.
///
/// Built once via [`HandlerOptions::builder`]; readers observe a stable
/// snapshot for the lifetime of each connection.
pub struct HandlerOptions {
    /// Listen address, for logging
    pub addr: String,
    /// Upstream dialer
    pub chain: Arc<dyn Chain>,
    /// Accepted client credentials; empty disables authentication
    pub users: Vec<Credential>,
    /// TLS termination config for listeners that need it
    pub tls: Option<Arc<rustls::ServerConfig>>,
    pub whitelist: Option<Arc<Permissions>>,
    pub blacklist: Option<Arc<Permissions>>,
    pub bypass: Option<Arc<Bypass>>,
    /// Node selection strategy for multi-upstream setups
    pub strategy: Arc<dyn Strategy>,
    /// Dial retries handed to the chain
    pub retries: u32,
    /// Dial timeout handed to the chain
    pub timeout: Option<Duration>,
    pub resolver: Option<Arc<Resolver>>,
    pub hosts: Option<Arc<Hosts>>,
}

impl HandlerOptions {
    pub fn builder() -> HandlerOptionsBuilder {
        HandlerOptionsBuilder::default()
    }

    /// The per-dial options handed to the chain for this config.
    pub(crate) fn dial_options(&self) -> DialOptions {
        DialOptions {
            retries: self.retries,
            timeout: self.timeout,
            hosts: self.hosts.clone(),
            resolver: self.resolver.clone(),
        }
    }

    /// Whitelist/blacklist verdict for a TCP target.
    pub(crate) fn authorized(&self, addr: &str) -> bool {
        let ok = can_access(
            "tcp",
            addr,
            self.whitelist.as_deref(),
            self.blacklist.as_deref(),
        );
        if !ok {
            info!(target = addr, "unauthorized");
        }
        ok
    }

    /// Bypass membership; a hit means close without forwarding.
    pub(crate) fn bypassed(&self, addr: &str) -> bool {
        let hit = self
            .bypass
            .as_ref()
            .map(|b| b.contains(addr))
            .unwrap_or(false);
        if hit {
            info!(target = addr, "bypassed");
        }
        hit
    }

    /// Verify a username/password pair against the configured users.
    pub(crate) fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.users
            .iter()
            .any(|c| c.username == username && c.password == password)
    }
}

/// Option-by-option construction for [`HandlerOptions`].
pub struct HandlerOptionsBuilder {
    options: HandlerOptions,
}

impl Default for HandlerOptionsBuilder {
    fn default() -> Self {
        Self {
            options: HandlerOptions {
                addr: String::new(),
                chain: Arc::new(DirectChain::new()),
                users: Vec::new(),
                tls: None,
                whitelist: None,
                blacklist: None,
                bypass: None,
                strategy: Arc::new(RoundStrategy::default()),
                retries: 0,
                timeout: None,
                resolver: None,
                hosts: None,
            },
        }
    }
}

impl HandlerOptionsBuilder {
    #[must_use]
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.options.addr = addr.into();
        self
    }

    #[must_use]
    pub fn chain(mut self, chain: Arc<dyn Chain>) -> Self {
        self.options.chain = chain;
        self
    }

    #[must_use]
    pub fn users(mut self, users: Vec<Credential>) -> Self {
        self.options.users = users;
        self
    }

    #[must_use]
    pub fn tls(mut self, tls: Arc<rustls::ServerConfig>) -> Self {
        self.options.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn whitelist(mut self, whitelist: Arc<Permissions>) -> Self {
        self.options.whitelist = Some(whitelist);
        self
    }

    #[must_use]
    pub fn blacklist(mut self, blacklist: Arc<Permissions>) -> Self {
        self.options.blacklist = Some(blacklist);
        self
    }

    #[must_use]
    pub fn bypass(mut self, bypass: Arc<Bypass>) -> Self {
        self.options.bypass = Some(bypass);
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.options.strategy = strategy;
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.options.retries = retries;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.options.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn hosts(mut self, hosts: Arc<Hosts>) -> Self {
        self.options.hosts = Some(hosts);
        self
    }

    pub fn build(self) -> Arc<HandlerOptions> {
        Arc::new(self.options)
    }
}
