//! Request routing to mounted distributions.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::discovery::Mount;

/// Where a request path leads.
#[derive(Debug, Clone)]
pub enum Route {
    /// `/<prefix>` without the trailing slash.
    Redirect(Arc<Mount>),
    /// `/<prefix>/` or `/<prefix>/boot.ipxe`.
    BootScript(Arc<Mount>),
    /// A file inside the mount.
    File { mount: Arc<Mount>, path: String },
    /// Not inside any mount.
    Static,
}

/// Immutable set of mounts, longest prefix first.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    mounts: Vec<Arc<Mount>>,
}

impl CatalogSnapshot {
    pub fn new(mounts: Vec<Mount>) -> Self {
        let mut mounts: Vec<Arc<Mount>> = mounts.into_iter().map(Arc::new).collect();
        mounts.sort_by(|a, b| {
            b.prefix()
                .len()
                .cmp(&a.prefix().len())
                .then_with(|| a.prefix().cmp(b.prefix()))
        });
        Self { mounts }
    }

    pub fn mounts(&self) -> &[Arc<Mount>] {
        &self.mounts
    }

    /// Route a decoded request path.
    pub fn route(&self, path: &str) -> Route {
        let trimmed = path.trim_start_matches('/');
        for mount in &self.mounts {
            let prefix = mount.prefix();
            let rest = if prefix.is_empty() {
                trimmed
            } else if trimmed == prefix {
                return Route::Redirect(Arc::clone(mount));
            } else if let Some(rest) = trimmed
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                rest
            } else {
                continue;
            };

            return match rest {
                "" | "boot.ipxe" => Route::BootScript(Arc::clone(mount)),
                _ => Route::File {
                    mount: Arc::clone(mount),
                    path: rest.to_string(),
                },
            };
        }
        Route::Static
    }
}

/// Current mounts, replaceable while requests are in flight.
///
/// Readers load a snapshot and keep it for the whole request; a rescan
/// stores a new snapshot in one pointer swap.
#[derive(Debug)]
pub struct BootCatalog {
    snapshot: ArcSwap<CatalogSnapshot>,
}

impl Default for BootCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl BootCatalog {
    pub fn new(mounts: Vec<Mount>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(CatalogSnapshot::new(mounts)),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.load_full()
    }

    /// Swap in a freshly discovered set of mounts.
    pub fn replace(&self, mounts: Vec<Mount>) {
        let count = mounts.len();
        self.snapshot.store(Arc::new(CatalogSnapshot::new(mounts)));
        info!(mount_count = count, "Boot catalog updated");
    }

    pub fn route(&self, path: &str) -> Route {
        self.snapshot.load().route(path)
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use osboot_distro::Distro;
    use osboot_tree::RawTree;

    use super::*;

    fn mount(prefix: &str) -> Mount {
        let kind = osboot_distro::standard_kinds().remove(0);
        Mount::new(prefix, Distro::new(kind, Arc::new(RawTree::new("/nonexistent"))))
    }

    fn prefix_of(route: &Route) -> Option<&str> {
        match route {
            Route::Redirect(m) | Route::BootScript(m) | Route::File { mount: m, .. } => {
                Some(m.prefix())
            }
            Route::Static => None,
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let snapshot = CatalogSnapshot::new(vec![mount("isos"), mount("isos/fedora")]);
        let route = snapshot.route("/isos/fedora/images/pxeboot/vmlinuz");
        assert_eq!(prefix_of(&route), Some("isos/fedora"));
        assert!(matches!(route, Route::File { ref path, .. } if path == "images/pxeboot/vmlinuz"));

        let route = snapshot.route("/isos/fedora-live/x");
        assert_eq!(prefix_of(&route), Some("isos"));
    }

    #[test]
    fn test_boot_and_redirect_routes() {
        let snapshot = CatalogSnapshot::new(vec![mount("debian")]);
        assert!(matches!(snapshot.route("/debian"), Route::Redirect(_)));
        assert!(matches!(snapshot.route("/debian/"), Route::BootScript(_)));
        assert!(matches!(snapshot.route("/debian/boot.ipxe"), Route::BootScript(_)));
        assert!(matches!(snapshot.route("/debianx/"), Route::Static));
        assert!(matches!(snapshot.route("/"), Route::Static));
    }

    #[test]
    fn test_root_mount_catches_everything_else() {
        let snapshot = CatalogSnapshot::new(vec![mount(""), mount("debian")]);
        assert!(matches!(snapshot.route("/"), Route::BootScript(_)));
        assert_eq!(prefix_of(&snapshot.route("/debian/x")), Some("debian"));
        assert!(matches!(
            snapshot.route("/other/file"),
            Route::File { ref path, .. } if path == "other/file"
        ));
    }

    #[test]
    fn test_replace_swaps_snapshot() {
        let catalog = BootCatalog::default();
        assert!(catalog.is_empty());
        let before = catalog.snapshot();

        catalog.replace(vec![mount("a")]);
        assert_eq!(catalog.len(), 1);
        assert!(before.mounts().is_empty());
    }
}
