//! osboot boot server
//!
//! Publishes every distribution found below the storage root over HTTP,
//! together with an iPXE script that boots it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use osboot_bootd::{
    api,
    catalog::BootCatalog,
    config,
    rescan::{scan, RescanWorker},
    state::AppState,
};
use osboot_distro::DetectionCascade;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to OSBOOT_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting osboot bootd");
    info!(
        root = %config.root.display(),
        listen_addr = %config.listen_addr,
        cache_max_age_secs = config.cache_max_age.as_secs(),
        "Configuration loaded"
    );

    let cascade = Arc::new(DetectionCascade::standard());
    let mounts = scan(config.root.clone(), Arc::clone(&cascade))
        .await
        .context("initial discovery failed")?;
    if mounts.is_empty() {
        warn!(root = %config.root.display(), "No distributions found");
    }
    let catalog = Arc::new(BootCatalog::new(mounts));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let rescan_handle = config.rescan_interval.map(|interval| {
        let worker = RescanWorker::new(
            config.root.clone(),
            interval,
            Arc::clone(&cascade),
            Arc::clone(&catalog),
        );
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    });

    let state = AppState::new(config.clone(), catalog);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    if let Some(handle) = rescan_handle {
        if let Err(e) = tokio::time::timeout(Duration::from_secs(10), handle).await {
            warn!(error = %e, "Rescan worker did not shut down in time");
        }
    }

    info!("bootd shutdown complete");
    Ok(())
}
