//! clawdeck - Fleet monitor daemon
//!
//! Holds one control-plane connection to an agent Gateway, keeps a live view
//! of the fleet and optionally serves Prometheus metrics.

use clap::Parser;
use clawdeck_monitor::{run_metrics_server, Config, Metrics, Monitor, NoticeLevel};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clawdeck")]
#[command(about = "Fleet monitor daemon for an agent Gateway")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "CLAWDECK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match Config::load_from(args.config.as_deref()) {
        Ok(c) => {
            if let Some(ref path) = args.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.load_secrets() {
        tracing::error!("Failed to load gateway token: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting clawdeck monitor");
    tracing::info!("  Gateway: {}", config.gateway.url);
    tracing::info!(
        "  Authentication: {}",
        if config.gateway.token.is_some() {
            "token"
        } else if config.gateway.password.is_some() {
            "password"
        } else {
            "none"
        }
    );
    tracing::info!(
        "  Refresh every {}s, health every {}s",
        config.polling.refresh_interval_secs,
        config.polling.health_interval_secs
    );

    let metrics_enabled = config.metrics.enabled;
    let metrics_addr = config.metrics.bind_addr;
    let monitor = Monitor::new(config)?;

    // Optional metrics endpoint
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let metrics_handle = if metrics_enabled {
        let metrics = Arc::new(Metrics::new()?);
        monitor.set_metrics(metrics.clone());
        tracing::info!("  Metrics: http://{}/metrics", metrics_addr);

        let shutdown_rx = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(metrics_addr, metrics, shutdown_rx).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }))
    } else {
        tracing::info!("  Metrics: disabled");
        None
    };

    // Surface operator notices in the log
    let mut notices = monitor.notices();
    let notice_handle = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => {
                    let description = notice.description.unwrap_or_default();
                    match notice.level {
                        NoticeLevel::Error => tracing::error!("{}: {}", notice.title, description),
                        NoticeLevel::Warning => tracing::warn!("{}: {}", notice.title, description),
                        NoticeLevel::Info | NoticeLevel::Success => {
                            tracing::info!("{}: {}", notice.title, description)
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!("Dropped {} notices", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match monitor.start().await {
        Ok(hello) => tracing::info!("Connected (protocol {})", hello.protocol),
        Err(e) => {
            tracing::error!("Failed to connect to gateway: {}", e);
            let _ = shutdown_tx.send(());
            notice_handle.abort();
            return Err(e.into());
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping monitor...");

    monitor.stop();
    let _ = shutdown_tx.send(());
    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }
    notice_handle.abort();

    tracing::info!("Monitor stopped");
    Ok(())
}
