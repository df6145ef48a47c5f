//! Address pattern matchers
//!
//! A [`Matcher`] is a predicate over a host string. The variant is chosen by
//! parse dispatch: a pattern that parses as an IP address becomes an IP
//! matcher, one that parses as CIDR notation becomes a CIDR matcher, and
//! everything else is treated as a domain pattern with glob support
//! (`*.example.com`, or the `.example.com` shorthand that also matches the
//! apex).

use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use regex::Regex;

/// A single address predicate.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Matches one specific IP address (IPv4-mapped IPv6 equivalence holds)
    Ip(IpAddr),
    /// Matches addresses inside a network
    Cidr(IpNet),
    /// Matches a domain exactly or through its compiled glob
    Domain {
        /// Canonical pattern with any leading dot stripped
        pattern: String,
        /// Compiled glob; `None` if the pattern had no usable glob form
        glob: Option<Regex>,
    },
}

impl Matcher {
    /// Create a matcher for the given pattern.
    ///
    /// Returns `None` for an empty pattern.
    pub fn new(pattern: &str) -> Option<Self> {
        if pattern.is_empty() {
            return None;
        }
        if let Ok(ip) = pattern.parse::<IpAddr>() {
            return Some(Self::Ip(ip));
        }
        if let Ok(net) = pattern.parse::<IpNet>() {
            return Some(Self::Cidr(net));
        }
        Some(Self::domain(pattern))
    }

    /// Create a domain matcher.
    ///
    /// A pattern with a leading dot is stored without the dot and globs as
    /// `*<pattern>`, so `.example.com` matches both `example.com` (exact)
    /// and any subdomain (glob).
    pub fn domain(pattern: &str) -> Self {
        let (canonical, glob_pattern) = match pattern.strip_prefix('.') {
            Some(trimmed) => (trimmed.to_string(), format!("*{pattern}")),
            None => (pattern.to_string(), pattern.to_string()),
        };
        Self::Domain {
            pattern: canonical,
            glob: compile_glob(&glob_pattern),
        }
    }

    /// Report whether `addr` matches this predicate.
    pub fn matches(&self, addr: &str) -> bool {
        match self {
            Self::Ip(ip) => addr
                .parse::<IpAddr>()
                .map(|a| canonical_ip(a) == canonical_ip(*ip))
                .unwrap_or(false),
            Self::Cidr(net) => addr
                .parse::<IpAddr>()
                .map(|a| net.contains(&canonical_ip(a)))
                .unwrap_or(false),
            Self::Domain { pattern, glob } => {
                if addr == pattern {
                    return true;
                }
                glob.as_ref().map(|g| g.is_match(addr)).unwrap_or(false)
            }
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "ip {ip}"),
            Self::Cidr(net) => write!(f, "cidr {net}"),
            Self::Domain { pattern, .. } => write!(f, "domain {pattern}"),
        }
    }
}

/// Reduce an IPv4-mapped IPv6 address to its IPv4 form so that
/// `::ffff:1.2.3.4` compares equal to `1.2.3.4` and is contained by
/// IPv4 networks.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => ip,
        },
        IpAddr::V4(_) => ip,
    }
}

/// Compile a glob pattern into an anchored regex.
///
/// `*` matches any run of characters (dots included) and `?` matches one
/// character; everything else is literal.
fn compile_glob(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}
