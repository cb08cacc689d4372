//! hostpatch - Entry point.
//!
//! This binary sniffs DNS responses on the local network. Hosts that the
//! upstream resolver answers with 0.0.0.0 are resolved through an external
//! lookup API and pinned in the local hosts file.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hostpatch::config::Config;
use hostpatch::dns::{HostLedger, NslookupClient, SharedLedger};
use hostpatch::engine::ResolutionEngine;
use hostpatch::flush::SystemFlusher;
use hostpatch::hosts::HostsFile;
use hostpatch::network::{PnetCapture, find_interface, interface_names};
use hostpatch::sniffer::{SniffStats, run_sniffer};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Spawn the packet capture thread that feeds the ledger.
fn spawn_capture_task(
    capture: PnetCapture,
    ledger: SharedLedger,
    running: Arc<AtomicBool>,
) -> JoinHandle<hostpatch::Result<SniffStats>> {
    tokio::task::spawn_blocking(move || run_sniffer(capture, ledger, running))
}

/// Wait for Ctrl-C or for the capture to end, then stop both tasks.
async fn wait_for_shutdown(
    running: Arc<AtomicBool>,
    mut capture_handle: JoinHandle<hostpatch::Result<SniffStats>>,
    engine_handle: JoinHandle<()>,
) -> Result<()> {
    let capture_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down...");
            running.store(false, Ordering::SeqCst);
            (&mut capture_handle).await
        }
        result = &mut capture_handle => {
            running.store(false, Ordering::SeqCst);
            result
        }
    };

    // An append already handed to the blocking pool still runs to completion.
    engine_handle.abort();
    if let Err(err) = engine_handle.await
        && !err.is_cancelled()
    {
        warn!("Resolution task failed: {err}");
    }

    match capture_result.context("Capture task panicked")? {
        Ok(stats) => {
            info!(
                frames = stats.frames,
                responses = stats.responses,
                decode_errors = stats.decode_errors,
                blackholed = stats.blackholed,
                "Shutdown complete."
            );
            Ok(())
        }
        Err(err) => {
            error!("Capture failed: {err}");
            Err(anyhow!(err).context("Packet capture stopped"))
        }
    }
}

fn load_config() -> Result<Config> {
    match std::env::var("CONFIG_PATH") {
        Ok(path) => Config::load(&path).with_context(|| format!("Failed to load {path}")),
        Err(_) => {
            if Path::new(DEFAULT_CONFIG_PATH).exists() {
                Config::load(DEFAULT_CONFIG_PATH).context("Failed to load configuration")
            } else {
                info!("No config.toml found, using defaults");
                Ok(Config::default())
            }
        }
    }
}

async fn run() -> Result<()> {
    let config = load_config()?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    hostpatch::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting hostpatch...");
    info!("Hosts file: {}", config.hosts_path.display());
    info!("Lookup endpoint: {}", config.lookup.endpoint);
    info!("Resolution interval: {:?}", config.cycle_interval());

    let mut hosts = HostsFile::open(&config.hosts_path).context("Failed to open hosts file")?;
    let known = hosts.load().context("Failed to read hosts file")?;
    info!("Loaded {} known hosts", known.len());
    let ledger = HostLedger::new(known).shared();

    let interface = match find_interface(config.interface.as_deref()) {
        Ok(interface) => interface,
        Err(err) => {
            error!("Available interfaces: {}", interface_names().join(", "));
            return Err(err).context("Failed to find network interface");
        }
    };
    info!("Sniffing on interface: {}", interface.name);

    let capture = PnetCapture::new(&interface).context("Failed to open packet capture")?;
    let lookup =
        NslookupClient::from_settings(&config.lookup).context("Failed to create lookup client")?;
    let flusher = SystemFlusher::from_settings(&config.flush);
    if !flusher.is_enabled() {
        info!("Resolver cache flushing disabled");
    }

    let running = Arc::new(AtomicBool::new(true));

    let engine = ResolutionEngine::new(
        Arc::clone(&ledger),
        hosts,
        lookup,
        flusher,
        config.cycle_interval(),
    );
    let engine_handle = tokio::spawn(engine.run(Arc::clone(&running)));

    let capture_handle = spawn_capture_task(capture, ledger, Arc::clone(&running));

    wait_for_shutdown(running, capture_handle, engine_handle).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    run().await
}
