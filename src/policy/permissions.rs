//! Whitelist / blacklist authorization
//!
//! A [`Permissions`] set is a list of rules granting an action (`tcp`,
//! `udp`, or `*`) toward hosts and ports. Handlers call [`can_access`] with
//! both lists before dialing: the whitelist must grant (or be absent) and
//! the blacklist must not.

use super::matcher::Matcher;
use super::split_host_port;

/// One authorization rule.
#[derive(Debug, Clone, Default)]
pub struct Permission {
    /// Granted actions; empty or `*` means any
    pub actions: Vec<String>,
    /// Host patterns (IP, CIDR or domain glob); empty means any host
    pub hosts: Vec<String>,
    /// Inclusive port ranges; empty means any port
    pub ports: Vec<(u16, u16)>,
}

impl Permission {
    fn grants(&self, action: &str, host: &str, port: u16) -> bool {
        let action_ok = self.actions.is_empty()
            || self.actions.iter().any(|a| a == "*" || a == action);
        if !action_ok {
            return false;
        }

        let host_ok = self.hosts.is_empty()
            || self
                .hosts
                .iter()
                .filter_map(|p| Matcher::new(p))
                .any(|m| m.matches(host));
        if !host_ok {
            return false;
        }

        self.ports.is_empty() || self.ports.iter().any(|&(lo, hi)| lo <= port && port <= hi)
    }
}

/// An ordered set of authorization rules.
#[derive(Debug, Clone, Default)]
pub struct Permissions(Vec<Permission>);

impl Permissions {
    pub fn new(rules: Vec<Permission>) -> Self {
        Self(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Report whether any rule grants `action` toward `host:port`.
    pub fn grants(&self, action: &str, host: &str, port: u16) -> bool {
        self.0.iter().any(|p| p.grants(action, host, port))
    }
}

/// Check `addr` (`host:port`) against the whitelist and blacklist.
///
/// Access is allowed iff the whitelist is absent/empty or grants the
/// request, and the blacklist (if any) does not.
pub fn can_access(
    action: &str,
    addr: &str,
    whitelist: Option<&Permissions>,
    blacklist: Option<&Permissions>,
) -> bool {
    let (host, port) = match split_host_port(addr) {
        Some((h, p)) => (h, p.parse::<u16>().unwrap_or(0)),
        None => (addr, 0),
    };

    let whitelisted = match whitelist {
        Some(wl) if !wl.is_empty() => wl.grants(action, host, port),
        _ => true,
    };
    let blacklisted = match blacklist {
        Some(bl) if !bl.is_empty() => bl.grants(action, host, port),
        _ => false,
    };
    whitelisted && !blacklisted
}
