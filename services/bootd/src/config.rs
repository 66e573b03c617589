use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Storage root searched when `OSBOOT_ROOT` is unset.
pub const DEFAULT_ROOT: &str = "/var/lib/tftpboot";

/// Freshness lifetime of served files: 12 hours.
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(43_200);

/// Shortest accepted rescan interval.
pub const MIN_RESCAN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub listen_addr: SocketAddr,
    pub cache_max_age: Duration,
    pub rescan_interval: Option<Duration>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let root = var("OSBOOT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));

        let listen_addr = var("OSBOOT_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let listen_addr = listen_addr
            .parse()
            .with_context(|| format!("invalid OSBOOT_LISTEN_ADDR {listen_addr:?}"))?;

        let cache_max_age = match var("OSBOOT_CACHE_MAX_AGE_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .with_context(|| format!("invalid OSBOOT_CACHE_MAX_AGE_SECS {secs:?}"))?,
            ),
            None => DEFAULT_CACHE_MAX_AGE,
        };

        let rescan_interval = match var("OSBOOT_RESCAN_INTERVAL_SECS") {
            Some(secs) => {
                let interval = Duration::from_secs(
                    secs.parse()
                        .with_context(|| format!("invalid OSBOOT_RESCAN_INTERVAL_SECS {secs:?}"))?,
                );
                if interval < MIN_RESCAN_INTERVAL {
                    bail!(
                        "OSBOOT_RESCAN_INTERVAL_SECS must be at least {}",
                        MIN_RESCAN_INTERVAL.as_secs()
                    );
                }
                Some(interval)
            }
            None => None,
        };

        let log_level = var("OSBOOT_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            root,
            listen_addr,
            cache_max_age,
            rescan_interval,
            log_level,
        })
    }

    /// Defaults with a different storage root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            rescan_interval: None,
            log_level: "info".to_string(),
        }
    }
}
