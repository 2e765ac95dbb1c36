//! nodeproxy - dispatch requests across a configured node set
//!
//! Usage:
//!     nodeproxy --config <path> --url <url> [-n <count>]
//!
//! See --help for more options.

use anyhow::{Context, Result, bail};
use clap::Parser;
use http_body_util::BodyExt;
use hyper::{Request, Uri};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use nodeproxy::config::{Config, ConfigWatcher, load_config};
use nodeproxy::proxy::{ReverseProxy, empty};
use nodeproxy::selector::{Peer, Scope};
use nodeproxy::util::{CancelSignal, init_logging};

/// Send requests through a load-balanced node set and report where they went.
#[derive(Parser, Debug)]
#[command(name = "nodeproxy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Request URL; scheme and authority are replaced by each selected node
    #[arg(short, long, value_name = "URL")]
    url: Option<Uri>,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    /// Pause between requests (e.g. 250ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Reload nodes when the configuration file changes
    #[arg(long)]
    watch: bool,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);
    init_logging(log_level, &config.global.log_format).context("failed to initialize logging")?;

    if cli.validate {
        info!("configuration is valid");
        println!("Configuration is valid.");
        println!("  Algorithm: {:?}", config.selector.algorithm);
        println!("  Nodes: {}", config.nodes.len());
        for node in config.nodes() {
            println!(
                "    - {} (weight {}, version '{}')",
                node,
                node.weight_or_default(),
                node.version()
            );
        }
        return Ok(());
    }

    let Some(url) = cli.url.clone() else {
        bail!("--url is required unless --validate is given");
    };

    info!(
        config_path = %cli.config.display(),
        algorithm = ?config.selector.algorithm,
        nodes = config.nodes.len(),
        "nodeproxy starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run(cli, config, url))
}

async fn run(cli: Cli, config: Config, url: Uri) -> Result<()> {
    let proxy = Arc::new(ReverseProxy::from_config(&config));

    let stop = CancelSignal::new();
    let watcher = cli.watch.then(|| {
        let watcher = ConfigWatcher::applying_to(cli.config.clone(), proxy.clone());
        tokio::spawn(watcher.run(stop.clone()))
    });

    let mut served: BTreeMap<String, usize> = BTreeMap::new();
    let mut failures = 0usize;

    for i in 0..cli.count {
        if i > 0 {
            if let Some(interval) = cli.interval {
                tokio::time::sleep(interval).await;
            }
        }

        let req = Request::get(url.clone())
            .body(empty())
            .context("failed to build request")?;
        let mut scope = Scope::new().with_peer(Peer::new());

        match proxy.dispatch_with(req, &mut scope).await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp
                    .into_body()
                    .collect()
                    .await
                    .context("failed to read response body")?
                    .to_bytes();
                if let Some(node) = scope.pinned_node() {
                    *served.entry(node.address().to_string()).or_default() += 1;
                    info!(node = node.address(), %status, bytes = body.len(), "response");
                }
            }
            Err(e) if e.is_no_available_node() => {
                bail!("no available node; check the configured node list")
            }
            Err(e) => {
                failures += 1;
                warn!(error = %e, "request failed");
            }
        }
    }

    stop.cancel();
    if let Some(handle) = watcher {
        let _ = handle.await;
    }

    println!("Requests: {}, failures: {}", cli.count, failures);
    for (node, count) in &served {
        println!("  {}: {}", node, count);
    }
    Ok(())
}
