//! Live-reload support for policy components
//!
//! Bypass, Hosts and Resolver all consume the same line-oriented grammar:
//! `#` starts a comment, tabs count as blanks, surrounding whitespace is
//! trimmed and empty lines are skipped. Each component recognizes its own
//! directives (`reload`, `reverse`, `timeout`, `ttl`) and treats every other
//! line as a record.
//!
//! The loader side is deliberately thin: a [`Reloader`] accepts an opaque
//! reader, and [`spawn_file_reloader`] re-feeds a file into it on the period
//! the component itself reports.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

/// A component that accepts a fresh configuration stream and atomically
/// installs it while serving concurrent reads.
pub trait Reloader: Send + Sync {
    /// Parse config from `r`, then live-reload the component.
    ///
    /// Only scanner-level failures are errors; malformed records are
    /// silently dropped per the file grammar.
    fn reload(&self, r: &mut dyn BufRead) -> std::io::Result<()>;

    /// The reload period requested by the last loaded config.
    /// Zero means no periodic reloading.
    fn period(&self) -> Duration;
}

/// Split a config line into fields.
///
/// Strips the `#` comment suffix and splits on runs of blanks or tabs.
/// Returns `None` for lines that are empty after stripping.
pub(crate) fn split_line(line: &str) -> Option<Vec<&str>> {
    let line = match line.find('#') {
        Some(n) => &line[..n],
        None => line,
    };
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Parse a duration field such as `10s`, `2m` or `300ms`.
///
/// Returns `None` on malformed input; directive lines with bad values are
/// ignored rather than failing the reload.
pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    humantime::parse_duration(s).ok()
}

/// Parse a boolean field, accepting the common spellings.
pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Periodically re-read `path` into `reloader`.
///
/// The task performs one reload per tick of the component's current period;
/// a period of zero pauses reloading until a later config raises it again.
/// The task runs until the returned handle is aborted or dropped into a
/// detached runtime shutdown.
pub fn spawn_file_reloader(
    reloader: Arc<dyn Reloader>,
    path: impl Into<PathBuf>,
) -> tokio::task::JoinHandle<()> {
    let path = path.into();
    tokio::spawn(async move {
        loop {
            let period = reloader.period();
            if period.is_zero() {
                // Re-check occasionally in case a manual reload raised it.
                tokio::time::sleep(Duration::from_secs(60)).await;
                continue;
            }
            tokio::time::sleep(period).await;

            match std::fs::File::open(&path) {
                Ok(f) => {
                    let mut r = std::io::BufReader::new(f);
                    if let Err(e) = reloader.reload(&mut r) {
                        warn!(path = %path.display(), error = %e, "reload failed");
                    } else {
                        debug!(path = %path.display(), "reloaded");
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "reload open failed");
                }
            }
        }
    })
}
