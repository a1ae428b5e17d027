//! VU Monitor Application
//!
//! Runs the level pipeline against a synthetic engine and serves the
//! meters over HTTP/WebSocket.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vu_telemetry::{
    config::AppConfig,
    engine::{EngineSimulator, LoopbackSource},
    session::MonitoringSession,
    telemetry::TelemetryStore,
    ui::WebServer,
};

/// Config path from the first argument, else the per-user default
fn load_config() -> Result<AppConfig> {
    let path = std::env::args().nth(1).map(PathBuf::from).or_else(AppConfig::default_path);

    match path {
        Some(path) if path.exists() => {
            tracing::info!("Loading config from {}", path.display());
            Ok(AppConfig::load(&path)?)
        }
        Some(path) => {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(AppConfig::default())
        }
        None => Ok(AppConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VU Monitor");

    let config = load_config()?;
    config.validate()?;

    // Synthetic engine behind an in-process source
    let source = Arc::new(LoopbackSource::new());
    source.set_streaming_supported(config.simulator.streaming);
    source.set_events_supported(config.simulator.events);

    let mut simulator = EngineSimulator::new(source.clone(), config.simulator.clone());
    simulator.start()?;

    // Session owns ingestion; the handle is shared with the web UI
    let store = Arc::new(TelemetryStore::new());
    let session = MonitoringSession::new(source.clone(), store.clone(), config.monitoring.clone()).spawn();
    let strategy = session.enable().await?;
    tracing::info!("Monitoring enabled via {}", strategy);

    // Start web UI
    let web_server = WebServer::new(config.ui.clone(), session.clone(), config.meter.clone());
    let _web_handle = web_server.start_background();

    tracing::info!("Web UI available at http://{}:{}", config.ui.bind_address, config.ui.http_port);

    // Periodic stats until Ctrl+C
    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    stats_interval.tick().await;
    loop {
        tokio::select! {
            _ = stats_interval.tick() => {
                match session.status().await {
                    Ok(status) => {
                        let snapshot = store.snapshot();
                        tracing::info!(
                            "Stats: strategy {:?}, {} frames, {} flushes, {} channels, version {}, engine cpu {:.1}%",
                            status.strategy,
                            status.frames,
                            status.flushes,
                            snapshot.channels.len(),
                            status.snapshot_version,
                            snapshot.metrics.cpu_usage
                        );
                    }
                    Err(e) => {
                        tracing::error!("Session stopped: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    session.disable().await.ok();
    session.shutdown().await.ok();
    simulator.stop();

    tracing::info!("VU Monitor stopped");
    Ok(())
}
