//! proxy-gateway: main entry point
//!
//! # Usage
//!
//! ```bash
//! # Auto-detecting gateway on the default port
//! proxy-gateway -l 0.0.0.0:8080
//!
//! # SNI gateway with a bypass list and a custom resolver
//! proxy-gateway -l 0.0.0.0:443 -m sni --bypass bypass.txt --resolver resolver.txt
//!
//! # Credentialed gateway (SOCKS4 is refused automatically)
//! proxy-gateway -l 0.0.0.0:8080 -u alice:secret -u bob:hunter2
//! ```
//!
//! Log verbosity follows `RUST_LOG` (e.g. `RUST_LOG=proxy_gateway=debug`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use proxy_gateway::handler::{AutoHandler, Credential, Handler, HandlerOptions};
use proxy_gateway::policy::{Bypass, Hosts};
use proxy_gateway::reload::{spawn_file_reloader, Reloader};
use proxy_gateway::resolver::Resolver;
use proxy_gateway::sni::SniHandler;

/// Listener mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Auto,
    Sni,
}

/// Command-line arguments
struct Args {
    listen: String,
    mode: Mode,
    bypass: Option<PathBuf>,
    hosts: Option<PathBuf>,
    resolver: Option<PathBuf>,
    users: Vec<Credential>,
    timeout: Option<Duration>,
    retries: u32,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut parsed = Self {
            listen: "127.0.0.1:8080".to_string(),
            mode: Mode::Auto,
            bypass: None,
            hosts: None,
            resolver: None,
            users: Vec::new(),
            timeout: None,
            retries: 0,
        };

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .with_context(|| format!("missing value for {name}"))
            };
            match arg.as_str() {
                "-l" | "--listen" => parsed.listen = value("--listen")?,
                "-m" | "--mode" => {
                    parsed.mode = match value("--mode")?.as_str() {
                        "auto" => Mode::Auto,
                        "sni" => Mode::Sni,
                        other => bail!("unknown mode: {other}"),
                    }
                }
                "--bypass" => parsed.bypass = Some(PathBuf::from(value("--bypass")?)),
                "--hosts" => parsed.hosts = Some(PathBuf::from(value("--hosts")?)),
                "--resolver" => parsed.resolver = Some(PathBuf::from(value("--resolver")?)),
                "-u" | "--user" => {
                    let raw = value("--user")?;
                    let cred = Credential::parse(&raw)
                        .with_context(|| format!("bad credential (want name:pass): {raw}"))?;
                    parsed.users.push(cred);
                }
                "-t" | "--timeout" => {
                    parsed.timeout = Some(
                        humantime::parse_duration(&value("--timeout")?)
                            .context("bad timeout duration")?,
                    );
                }
                "-r" | "--retries" => {
                    parsed.retries = value("--retries")?.parse().context("bad retry count")?;
                }
                "-h" | "--help" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => bail!("unknown argument: {other}"),
            }
        }
        Ok(parsed)
    }
}

fn print_usage() {
    println!(
        "proxy-gateway {}\n\n\
         USAGE:\n    proxy-gateway [OPTIONS]\n\n\
         OPTIONS:\n\
         \x20   -l, --listen <addr>     listen address (default 127.0.0.1:8080)\n\
         \x20   -m, --mode <mode>       auto | sni (default auto)\n\
         \x20       --bypass <file>     bypass policy file\n\
         \x20       --hosts <file>      hosts table file\n\
         \x20       --resolver <file>   resolver config file\n\
         \x20   -u, --user <name:pass>  client credential (repeatable)\n\
         \x20   -t, --timeout <dur>     upstream dial timeout (e.g. 10s)\n\
         \x20   -r, --retries <n>       upstream dial retries",
        proxy_gateway::VERSION
    );
}

/// Load a reloadable component from its file and start its periodic
/// reloader when the config asks for one.
fn load_component(reloader: Arc<dyn Reloader>, path: &PathBuf, what: &str) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("open {what} file {}", path.display()))?;
    let mut reader = std::io::BufReader::new(file);
    reloader
        .reload(&mut reader)
        .with_context(|| format!("parse {what} file {}", path.display()))?;
    if !reloader.period().is_zero() {
        info!(file = %path.display(), period = ?reloader.period(), "{what} reload scheduled");
        spawn_file_reloader(reloader, path.clone());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse()?;

    let mut builder = HandlerOptions::builder()
        .addr(args.listen.clone())
        .users(args.users.clone())
        .retries(args.retries);
    if let Some(timeout) = args.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(path) = &args.bypass {
        let bypass = Arc::new(Bypass::default());
        load_component(Arc::clone(&bypass) as Arc<dyn Reloader>, path, "bypass")?;
        builder = builder.bypass(bypass);
    }
    if let Some(path) = &args.hosts {
        let hosts = Arc::new(Hosts::default());
        load_component(Arc::clone(&hosts) as Arc<dyn Reloader>, path, "hosts")?;
        builder = builder.hosts(hosts);
    }
    if let Some(path) = &args.resolver {
        let resolver = Arc::new(Resolver::default());
        load_component(Arc::clone(&resolver) as Arc<dyn Reloader>, path, "resolver")?;
        builder = builder.resolver(resolver);
    }

    let options = builder.build();
    let handler: Arc<dyn Handler> = match args.mode {
        Mode::Auto => Arc::new(AutoHandler::new(options)),
        Mode::Sni => Arc::new(SniHandler::new(options)),
    };

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    info!(listen = %args.listen, mode = ?args.mode, "gateway up");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((conn, peer)) => {
                        conn.set_nodelay(true).ok();
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle(Box::new(conn), peer).await {
                                warn!(%peer, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}
