//! MR17 Telemetry Engine daemon
//!
//! Attaches to the CAN gateway, keeps the telemetry snapshot current and logs
//! it. Usage: `mr17-engine [settings.json]`

use anyhow::{Context, Result};
use mr17_core::FieldMask;
use mr17_engine::{Engine, EngineConfig, TickDriver};
use mr17_link::LinkReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting MR17 Telemetry Engine");

    let arg = std::env::args().nth(1).map(PathBuf::from);
    let config = match EngineConfig::locate(arg.as_deref()) {
        Some(path) => {
            info!("Loading settings from {}", path.display());
            EngineConfig::load(&path)?
        }
        None => {
            info!("No settings file found, using defaults");
            EngineConfig::default()
        }
    };

    let engine = Arc::new(Engine::new(&config).context("Failed to build engine")?);
    if config.debug {
        info!("Starting in debug mode");
    }

    info!(
        "Probing for gateway ({:?} at {} baud, {} prefix(es) x {} attempt(s))",
        config.link.device,
        config.link.baud,
        config.link.device_prefixes.len(),
        config.link.attempts
    );
    let probe = config.probe();
    let opener = config.opener();
    let link = LinkReader::attach(&probe, opener.clone(), config.link_settings()).await;
    if !link.is_attached() {
        warn!("Gateway not attached, will keep probing");
    }

    let cancel = CancellationToken::new();
    let driver = TickDriver::new(
        engine.clone(),
        link,
        probe,
        opener,
        config.driver_settings(),
    );
    let driver_task = tokio::spawn(driver.run(cancel.clone()));
    let logger_task = tokio::spawn(log_snapshots(engine.clone(), config.log_mask(), cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    cancel.cancel();
    driver_task.await.context("Tick driver panicked")?;
    logger_task.await.context("Snapshot logger panicked")?;

    info!("Final stats: {}", engine.stats());
    Ok(())
}

/// Log every snapshot at debug level and a stats summary periodically
async fn log_snapshots(engine: Arc<Engine>, mask: Option<FieldMask>, cancel: CancellationToken) {
    if let Some(mask) = &mask {
        let unknown = mask.unknown_fields();
        if !unknown.is_empty() {
            warn!("Unknown log_fields ignored: {}", unknown.join(", "));
        }
    }

    let mut snapshots = engine.snapshot_stream();
    let mut summary = tokio::time::interval(STATS_INTERVAL);
    summary.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = snapshots.next() => {
                let Some(snapshot) = next else { break };
                match snapshot.to_json_filtered(mask.as_ref()) {
                    Ok(json) => debug!("snapshot {}", json),
                    Err(e) => warn!("Failed to serialize snapshot {}: {}", snapshot.sequence, e),
                }
            }
            _ = summary.tick() => {
                info!("Ingest stats: {} (mode {:?})", engine.stats(), engine.composition_mode());
            }
        }
    }
}
