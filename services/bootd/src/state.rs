//! Application state shared across request handlers.

use std::sync::Arc;

use tower_http::services::ServeDir;

use crate::cache::CachePolicy;
use crate::catalog::BootCatalog;
use crate::config::Config;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    catalog: Arc<BootCatalog>,
    static_files: ServeDir,
}

impl AppState {
    pub fn new(config: Config, catalog: Arc<BootCatalog>) -> Self {
        let static_files = ServeDir::new(&config.root);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog,
                static_files,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Arc<BootCatalog> {
        &self.inner.catalog
    }

    /// File service over the whole storage root.
    pub fn static_files(&self) -> ServeDir {
        self.inner.static_files.clone()
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::new(self.inner.config.cache_max_age)
    }
}
