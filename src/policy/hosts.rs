//! Static hostname table
//!
//! A [`Hosts`] table maps hostnames and aliases to fixed IP addresses, in
//! the manner of an `/etc/hosts` file. Lookups scan entries in order and
//! are case-sensitive. Reload builds a fresh entry list and swaps the
//! snapshot pointer, so concurrent readers see either the old table or the
//! new one, never a mix.

use std::io::BufRead;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::reload::{parse_duration, split_line, Reloader};

/// A single host entry: one IP, a canonical hostname and optional aliases.
#[derive(Debug, Clone)]
pub struct Host {
    pub ip: IpAddr,
    pub hostname: String,
    pub aliases: Vec<String>,
}

impl Host {
    pub fn new(ip: IpAddr, hostname: impl Into<String>) -> Self {
        Self {
            ip,
            hostname: hostname.into(),
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

/// Static hostname → IP table with live reload.
pub struct Hosts {
    entries: ArcSwap<Vec<Host>>,
    period: Mutex<Duration>,
}

impl Hosts {
    /// Create a table from an initial entry list.
    pub fn new(entries: Vec<Host>) -> Self {
        Self {
            entries: ArcSwap::from_pointee(entries),
            period: Mutex::new(Duration::ZERO),
        }
    }

    /// Append an entry to the table.
    pub fn add_host(&self, host: Host) {
        self.entries.rcu(|entries| {
            let mut entries = (**entries).clone();
            entries.push(host.clone());
            entries
        });
    }

    /// Look up the IP for `name` against hostnames and aliases.
    ///
    /// The first matching entry wins. Matching is case-sensitive.
    pub fn lookup(&self, name: &str) -> Option<IpAddr> {
        let entries = self.entries.load();
        let ip = entries
            .iter()
            .find(|h| h.hostname == name || h.aliases.iter().any(|a| a == name))
            .map(|h| h.ip);
        if let Some(ip) = ip {
            debug!(host = name, %ip, "hosts hit");
        }
        ip
    }

    /// Number of entries currently installed.
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Hosts {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Reloader for Hosts {
    /// Parse the line grammar `IP canonical [aliases...]` plus the
    /// `reload <duration>` directive. Malformed lines (fewer than two
    /// fields, unparsable IP) are silently dropped.
    fn reload(&self, r: &mut dyn BufRead) -> std::io::Result<()> {
        let mut entries = Vec::new();

        for line in r.lines() {
            let line = line?;
            let Some(fields) = split_line(&line) else {
                continue;
            };
            if fields.len() < 2 {
                continue;
            }

            if fields[0].eq_ignore_ascii_case("reload") {
                *self.period.lock() = parse_duration(fields[1]).unwrap_or_default();
                continue;
            }

            let Ok(ip) = fields[0].parse::<IpAddr>() else {
                continue;
            };
            entries.push(
                Host::new(ip, fields[1]).with_aliases(fields[2..].iter().copied()),
            );
        }

        self.entries.store(Arc::new(entries));
        Ok(())
    }

    fn period(&self) -> Duration {
        *self.period.lock()
    }
}
