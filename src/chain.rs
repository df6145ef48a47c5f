//! Upstream dialing
//!
//! Handlers never dial targets themselves; they go through a [`Chain`],
//! which may route the connection over zero or more intermediate proxies.
//! This crate ships [`DirectChain`], the zero-hop implementation: it
//! resolves the target through the hosts table, then the resolver, and
//! dials with the per-dial retry and timeout options the handler supplies.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{ChainError, ResolveError};
use crate::io::BoxedStream;
use crate::policy::{split_host_port, Hosts};
use crate::resolver::Resolver;

/// Per-dial options carried from the handler into the chain.
#[derive(Clone, Default)]
pub struct DialOptions {
    /// Additional attempts after the first failure
    pub retries: u32,
    /// Per-attempt connect timeout; `None` dials without a bound
    pub timeout: Option<Duration>,
    /// Static host table consulted before the resolver
    pub hosts: Option<Arc<Hosts>>,
    /// Resolver for names not in the host table
    pub resolver: Option<Arc<Resolver>>,
}

/// The transport-chain collaborator: dials a `host:port` target.
#[async_trait]
pub trait Chain: Send + Sync {
    async fn dial(&self, addr: &str, opts: &DialOptions) -> Result<BoxedStream, ChainError>;
}

/// Dials targets directly, with resolution and retry handling.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectChain;

impl DirectChain {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `host` to candidate addresses: IP literals pass through,
    /// the hosts table takes precedence, the resolver covers the rest.
    async fn resolve(
        host: &str,
        opts: &DialOptions,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        if let Some(hosts) = &opts.hosts {
            if let Some(ip) = hosts.lookup(host) {
                return Ok(vec![ip]);
            }
        }
        if let Some(resolver) = &opts.resolver {
            return resolver.resolve(host).await;
        }
        let addrs = tokio::net::lookup_host((host, 0u16)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }

    async fn connect(addr: SocketAddr, timeout: Option<Duration>) -> io::Result<TcpStream> {
        let stream = match timeout {
            Some(t) => tokio::time::timeout(t, TcpStream::connect(addr))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
            None => TcpStream::connect(addr).await?,
        };
        stream.set_nodelay(true).ok();
        Ok(stream)
    }
}

#[async_trait]
impl Chain for DirectChain {
    async fn dial(&self, addr: &str, opts: &DialOptions) -> Result<BoxedStream, ChainError> {
        let (host, port) = split_host_port(addr).ok_or_else(|| ChainError::InvalidAddr {
            addr: addr.to_string(),
        })?;
        let port: u16 = port.parse().map_err(|_| ChainError::InvalidAddr {
            addr: addr.to_string(),
        })?;

        let ips = Self::resolve(host, opts)
            .await
            .map_err(|source| ChainError::Resolve {
                addr: addr.to_string(),
                source,
            })?;
        if ips.is_empty() {
            return Err(ChainError::InvalidAddr {
                addr: addr.to_string(),
            });
        }

        let attempts = opts.retries.saturating_add(1);
        let mut last_err = io::Error::new(io::ErrorKind::Other, "no dial attempted");
        for attempt in 0..attempts {
            for &ip in &ips {
                let target = SocketAddr::new(ip, port);
                match Self::connect(target, opts.timeout).await {
                    Ok(stream) => {
                        debug!(%target, attempt, "dialed");
                        return Ok(Box::new(stream));
                    }
                    Err(e) => {
                        warn!(%target, attempt, error = %e, "dial failed");
                        last_err = e;
                    }
                }
            }
        }
        Err(ChainError::Exhausted {
            addr: addr.to_string(),
            attempts,
            source: last_err,
        })
    }
}
