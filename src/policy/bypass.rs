//! Bypass policy list
//!
//! A [`Bypass`] holds an ordered list of [`Matcher`]s with a polarity flag.
//! `contains` walks the list left to right; the first match wins and the
//! result is XOR-ed with the `reversed` flag, so the same type expresses
//! both deny-lists (`reversed = false`) and allow-lists (`reversed = true`).

use std::fmt;
use std::io::BufRead;
use std::time::Duration;

use parking_lot::Mutex;

use super::matcher::Matcher;
use super::strip_port;
use crate::reload::{parse_bool, parse_duration, split_line, Reloader};

/// Live-reloadable state, mutated as one unit so concurrent `contains`
/// calls observe either the whole old config or the whole new one.
struct State {
    matchers: Vec<Matcher>,
    reversed: bool,
    period: Duration,
}

/// An address filter with reversible polarity and live reload.
pub struct Bypass {
    state: Mutex<State>,
}

impl Bypass {
    /// Create a bypass from matchers. The match result is negated when
    /// `reversed` is true.
    pub fn new(reversed: bool, matchers: Vec<Matcher>) -> Self {
        Self {
            state: Mutex::new(State {
                matchers,
                reversed,
                period: Duration::ZERO,
            }),
        }
    }

    /// Create a bypass from raw patterns; empty patterns are skipped.
    pub fn from_patterns<I, S>(reversed: bool, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matchers = patterns
            .into_iter()
            .filter_map(|p| Matcher::new(p.as_ref()))
            .collect();
        Self::new(reversed, matchers)
    }

    /// Report whether the bypass includes `addr`.
    ///
    /// A numeric `:port` suffix is stripped before matching, so
    /// `1.2.3.4:443` and `1.2.3.4` give the same answer.
    pub fn contains(&self, addr: &str) -> bool {
        let addr = strip_port(addr);

        let state = self.state.lock();
        let matched = state
            .matchers
            .iter()
            .any(|m| m.matches(addr));
        matched != state.reversed
    }

    /// Report whether the match results are reversed.
    pub fn reversed(&self) -> bool {
        self.state.lock().reversed
    }

    /// Append matchers to the list.
    pub fn add_matchers(&self, matchers: Vec<Matcher>) {
        self.state.lock().matchers.extend(matchers);
    }

    /// Number of matchers currently installed.
    pub fn len(&self) -> usize {
        self.state.lock().matchers.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Bypass {
    fn default() -> Self {
        Self::new(false, Vec::new())
    }
}

impl Reloader for Bypass {
    /// Parse the line grammar: `reload <duration>`, `reverse <bool>`, or a
    /// matcher pattern per line. The fresh matcher list replaces the live
    /// one in a single swap; only scanner errors fail the reload.
    fn reload(&self, r: &mut dyn BufRead) -> std::io::Result<()> {
        let mut matchers = Vec::new();
        let mut reversed = None;
        let mut period = None;

        for line in r.lines() {
            let line = line?;
            let Some(fields) = split_line(&line) else {
                continue;
            };

            if fields.len() == 2 && fields[0] == "reload" {
                period = Some(parse_duration(fields[1]).unwrap_or_default());
                continue;
            }
            if fields.len() == 2 && fields[0] == "reverse" {
                reversed = Some(parse_bool(fields[1]).unwrap_or(false));
                continue;
            }

            if let Some(m) = Matcher::new(&fields.join(" ")) {
                matchers.push(m);
            }
        }

        let mut state = self.state.lock();
        state.matchers = matchers;
        if let Some(reversed) = reversed {
            state.reversed = reversed;
        }
        if let Some(period) = period {
            state.period = period;
        }
        Ok(())
    }

    fn period(&self) -> Duration {
        self.state.lock().period
    }
}

impl fmt::Display for Bypass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        writeln!(f, "reversed: {}", state.reversed)?;
        for m in &state.matchers {
            writeln!(f, "{m}")?;
        }
        Ok(())
    }
}
