use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backhaul::cli::Args;
use backhaul::config::{Config, ProbeStrategy, RemoteKind};
use backhaul::export::{BatchReport, export_json, generate_report};
use backhaul::lookup::asn::CymruLookup;
use backhaul::lookup::ripe::RipeLookup;
use backhaul::lookup::ws::{WsLookup, WsSettings};
use backhaul::lookup::{AsnCache, AsnResolver, LookupStrategy, run_cache_sweeper};
use backhaul::prefs::Prefs;
use backhaul::probe::{SocketCapability, check_permissions};
use backhaul::route::RouteClassifier;
use backhaul::trace::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_tracing(args.log);

    // Defaults, then the prefs file, then the command line
    let mut config = Config::default();
    Prefs::load().apply(&mut config);
    config.apply_args(&args);

    // Raw ICMP is the only source for this strategy, so fail early
    match check_permissions() {
        Ok(SocketCapability::Dgram) => info!("raw sockets unavailable, using unprivileged ICMP"),
        Ok(SocketCapability::Raw) => {}
        Err(e) if config.strategy == ProbeStrategy::Icmp => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Err(e) => warn!(error = %e, "ICMP fallback will not be available"),
    }

    // Cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    let cache = Arc::new(AsnCache::new(config.cache_ttl));
    tokio::spawn(run_cache_sweeper(cache.clone(), config.sweep_interval, cancel.clone()));

    let strategies = build_strategies(&config, &cancel)?;
    let resolver = Arc::new(AsnResolver::new(cache, strategies, config.remote_timeout));
    let classifier = RouteClassifier::new(resolver);
    let orchestrator = Orchestrator::new(Arc::new(config.probe_plan()), classifier, config.deadline());

    let started_at = chrono::Utc::now();
    let results = orchestrator.run(&config.destinations, &cancel).await;
    let report = BatchReport::new(started_at, results);

    // Stop the sweeper and any remote session
    cancel.cancel();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if config.json {
        export_json(&report, &mut out).context("Failed to write JSON output")?;
        writeln!(out)?;
    } else {
        generate_report(&report, &mut out).context("Failed to write report")?;
    }
    out.flush()?;

    Ok(())
}

/// stderr logging; RUST_LOG overrides the -e switch
fn init_tracing(debug: bool) {
    let fallback = if debug { "warn,backhaul=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Prefix table first, then the configured remotes in order
fn build_strategies(config: &Config, cancel: &CancellationToken) -> Result<Vec<LookupStrategy>> {
    let mut strategies = vec![LookupStrategy::PrefixTable];
    for kind in &config.remotes {
        let remote: Arc<dyn backhaul::lookup::RemoteLookup> = match kind {
            RemoteKind::Http => Arc::new(
                RipeLookup::new(&config.ripe_url, config.remote_timeout)
                    .context("Failed to create HTTP lookup client")?,
            ),
            RemoteKind::Ws => Arc::new(WsLookup::spawn(
                WsSettings {
                    url: config.ws_url.clone(),
                    handshake_timeout: config.remote_timeout,
                    reply_timeout: config.remote_timeout,
                    sweep_interval: config.sweep_interval,
                },
                cancel.clone(),
            )),
            RemoteKind::Cymru => Arc::new(CymruLookup::new()),
        };
        strategies.push(LookupStrategy::Remote(remote));
    }
    Ok(strategies)
}
