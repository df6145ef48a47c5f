//! Caching DNS resolver
//!
//! The [`Resolver`] answers name lookups through a configurable list of
//! nameservers, front-loaded by a TTL cache:
//!
//! 1. IP literals are returned as-is with no cache interaction.
//! 2. A fresh cache entry answers immediately.
//! 3. Otherwise the nameservers are tried in order until one can be
//!    dialed, bounded by the resolver timeout; the answer (if any) is
//!    stored back into the cache.
//!
//! An empty server list falls back to operating-system resolution.
//!
//! Concurrent misses on the same name may each query upstream; the cache
//! trades that duplicate work for lock-free reads.

pub(crate) mod lookup;
pub mod nameserver;

pub use nameserver::{NameServer, NameServerProtocol};

use std::io::BufRead;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use hickory_proto::rr::RecordType;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::reload::{parse_duration, split_line, Reloader};

/// Default timeout for a whole lookup.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// One cached answer, stamped with wall-clock seconds. TTLs are coarse, so
/// wall-clock arithmetic is acceptable here.
struct CacheEntry {
    ips: Vec<IpAddr>,
    stored_at: i64,
}

/// Async DNS resolver with pluggable nameservers and a TTL cache.
pub struct Resolver {
    servers: RwLock<Vec<NameServer>>,
    /// Lookup timeout in milliseconds; 0 means [`DEFAULT_TIMEOUT`]
    timeout_ms: AtomicU64,
    /// Cache TTL in milliseconds; 0 means [`DEFAULT_TTL`], negative
    /// disables both reads and writes
    ttl_ms: AtomicI64,
    period: Mutex<Duration>,
    cache: DashMap<String, CacheEntry>,
}

impl Resolver {
    /// Create a resolver with the given nameservers and default
    /// timeout/TTL.
    pub fn new(servers: Vec<NameServer>) -> Self {
        Self {
            servers: RwLock::new(servers),
            timeout_ms: AtomicU64::new(0),
            ttl_ms: AtomicI64::new(0),
            period: Mutex::new(Duration::ZERO),
            cache: DashMap::new(),
        }
    }

    /// Set the lookup timeout. Zero keeps the default.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
        self
    }

    /// Set the cache TTL. Zero keeps the default.
    #[must_use]
    pub fn with_ttl(self, ttl: Duration) -> Self {
        self.ttl_ms.store(ttl.as_millis() as i64, Ordering::Relaxed);
        self
    }

    /// Disable the cache entirely (reads and writes).
    #[must_use]
    pub fn without_cache(self) -> Self {
        self.ttl_ms.store(-1, Ordering::Relaxed);
        self
    }

    /// The effective lookup timeout.
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms.load(Ordering::Relaxed) {
            0 => DEFAULT_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    /// The effective cache TTL; `None` when caching is disabled.
    fn cache_ttl(&self) -> Option<Duration> {
        match self.ttl_ms.load(Ordering::Relaxed) {
            ms if ms < 0 => None,
            0 => Some(DEFAULT_TTL),
            ms => Some(Duration::from_millis(ms as u64)),
        }
    }

    /// The configured nameservers.
    pub fn servers(&self) -> Vec<NameServer> {
        self.servers.read().clone()
    }

    /// Resolve `name` to its addresses.
    ///
    /// IP literals short-circuit; otherwise the cache is consulted and a
    /// nameserver lookup performed on a miss, bounded by [`Self::timeout`].
    pub async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        if let Ok(ip) = name.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if let Some(ips) = self.load_cache(name) {
            debug!(host = name, ?ips, "resolver cache hit");
            return Ok(ips);
        }

        let timeout = self.timeout();
        let ips = tokio::time::timeout(timeout, self.lookup(name))
            .await
            .map_err(|_| ResolveError::Timeout {
                name: name.to_string(),
                timeout,
            })??;

        self.store_cache(name, &ips);
        if !ips.is_empty() {
            debug!(host = name, ?ips, "resolved");
        }
        Ok(ips)
    }

    /// Drive the nameserver list: first dialable server wins and answers
    /// every query of this lookup. An empty list falls back to the OS.
    async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let servers = self.servers();
        if servers.is_empty() {
            return os_lookup(name).await;
        }

        let mut conn = None;
        for ns in &servers {
            match lookup::dial(ns).await {
                Ok(c) => {
                    conn = Some((c, ns));
                    break;
                }
                Err(e) => warn!(server = %ns, error = %e, "nameserver dial failed"),
            }
        }
        let Some((mut conn, ns)) = conn else {
            return Err(ResolveError::NoServer {
                name: name.to_string(),
            });
        };

        // One A query per lookup; AAAA only when the A answer is empty.
        let query = lookup::build_query(name, RecordType::A)?;
        let response = lookup::exchange(&mut conn, ns, &query).await?;
        let mut ips = lookup::answer_ips(&response);
        if ips.is_empty() {
            let query = lookup::build_query(name, RecordType::AAAA)?;
            let response = lookup::exchange(&mut conn, ns, &query).await?;
            ips = lookup::answer_ips(&response);
        }
        Ok(ips)
    }

    fn load_cache(&self, name: &str) -> Option<Vec<IpAddr>> {
        let ttl = self.cache_ttl()?;
        let entry = self.cache.get(name)?;
        let age = unix_now().saturating_sub(entry.stored_at);
        if age as u64 > ttl.as_secs() {
            return None;
        }
        if entry.ips.is_empty() {
            return None;
        }
        Some(entry.ips.clone())
    }

    fn store_cache(&self, name: &str, ips: &[IpAddr]) {
        if self.cache_ttl().is_none() || name.is_empty() || ips.is_empty() {
            return;
        }
        self.cache.insert(
            name.to_string(),
            CacheEntry {
                ips: ips.to_vec(),
                stored_at: unix_now(),
            },
        );
    }

    /// Number of cached names, expired entries included.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Reloader for Resolver {
    /// Parse the line grammar: `timeout <d>`, `ttl <d>`, `reload <d>`, or a
    /// nameserver record `addr [protocol [tls-hostname]]`. The server list
    /// is replaced wholesale; timeout and TTL changes are visible to
    /// in-flight lookups.
    fn reload(&self, r: &mut dyn BufRead) -> std::io::Result<()> {
        let mut servers = Vec::new();

        for line in r.lines() {
            let line = line?;
            let Some(fields) = split_line(&line) else {
                continue;
            };

            if fields.len() >= 2 {
                match fields[0].to_ascii_lowercase().as_str() {
                    "timeout" => {
                        let d = parse_duration(fields[1]).unwrap_or_default();
                        self.timeout_ms
                            .store(d.as_millis() as u64, Ordering::Relaxed);
                        continue;
                    }
                    "ttl" => {
                        let d = parse_duration(fields[1]).unwrap_or_default();
                        self.ttl_ms.store(d.as_millis() as i64, Ordering::Relaxed);
                        continue;
                    }
                    "reload" => {
                        *self.period.lock() = parse_duration(fields[1]).unwrap_or_default();
                        continue;
                    }
                    _ => {}
                }
            }

            let mut ns = NameServer::new(fields[0]);
            if fields.len() >= 2 {
                ns = ns.with_protocol(NameServerProtocol::parse(fields[1]));
            }
            if fields.len() >= 3 {
                ns = ns.with_hostname(fields[2]);
            }
            servers.push(ns);
        }

        *self.servers.write() = servers;
        Ok(())
    }

    fn period(&self) -> Duration {
        *self.period.lock()
    }
}

async fn os_lookup(name: &str) -> Result<Vec<IpAddr>, ResolveError> {
    let addrs = tokio::net::lookup_host((name, 0u16)).await?;
    let mut ips: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
    ips.dedup();
    Ok(ips)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
