//! Address policy fabric
//!
//! This module provides the predicates and tables the handlers consult
//! before forwarding a connection:
//!
//! - [`Matcher`]: a single IP / CIDR / domain-glob predicate
//! - [`Bypass`]: an ordered, reversible, live-reloadable matcher list
//! - [`Hosts`]: a static hostname → IP table with live reload
//! - [`Permissions`]: whitelist/blacklist authorization rules

pub mod bypass;
pub mod hosts;
pub mod matcher;
pub mod permissions;

pub use bypass::Bypass;
pub use hosts::{Host, Hosts};
pub use matcher::Matcher;
pub use permissions::{can_access, Permission, Permissions};

/// Split `addr` into host and port parts.
///
/// Handles the bracketed IPv6 form (`[::1]:443`). A bare IPv6 address
/// without brackets is not split; neither is an address without a port.
pub(crate) fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        Some((host, port))
    } else if addr.matches(':').count() == 1 {
        addr.split_once(':')
    } else {
        None
    }
}

/// Strip a numeric port suffix from `addr`, if present.
pub(crate) fn strip_port(addr: &str) -> &str {
    if let Some((host, port)) = split_host_port(addr) {
        if !host.is_empty() && port.parse::<u16>().map(|p| p > 0).unwrap_or(false) {
            return host;
        }
    }
    addr
}
