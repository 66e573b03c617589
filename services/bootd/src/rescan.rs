//! Periodic re-discovery of the storage root.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use osboot_distro::DetectionCascade;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::catalog::BootCatalog;
use crate::discovery::{discover, Mount};

/// Run [`discover`] on the blocking pool.
pub async fn scan(root: PathBuf, cascade: Arc<DetectionCascade>) -> Result<Vec<Mount>, JoinError> {
    tokio::task::spawn_blocking(move || discover(&root, &cascade)).await
}

/// Rebuilds the catalog on a fixed interval.
pub struct RescanWorker {
    root: PathBuf,
    interval: Duration,
    cascade: Arc<DetectionCascade>,
    catalog: Arc<BootCatalog>,
}

impl RescanWorker {
    pub fn new(
        root: PathBuf,
        interval: Duration,
        cascade: Arc<DetectionCascade>,
        catalog: Arc<BootCatalog>,
    ) -> Self {
        Self {
            root,
            interval,
            cascade,
            catalog,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting rescan worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // The catalog was just built; skip the immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match scan(self.root.clone(), Arc::clone(&self.cascade)).await {
                        Ok(mounts) => self.catalog.replace(mounts),
                        Err(e) => error!(error = %e, "Rescan failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Rescan worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
