//! Discovery of distribution trees below the storage root.

use std::path::Path;
use std::sync::Arc;

use osboot_distro::{DetectionCascade, Distro};
use osboot_tree::{ArchiveTree, RawTree, Tree};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A detected distribution published under a URL prefix.
#[derive(Debug)]
pub struct Mount {
    prefix: String,
    distro: Distro,
}

impl Mount {
    /// `prefix` has no leading or trailing `/`; the storage root itself is `""`.
    pub fn new(prefix: impl Into<String>, distro: Distro) -> Self {
        Self {
            prefix: prefix.into(),
            distro,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn distro(&self) -> &Distro {
        &self.distro
    }

    pub fn tree(&self) -> &Arc<dyn Tree> {
        self.distro.tree()
    }

    pub fn serves_files(&self) -> bool {
        self.distro.tree().serves_files()
    }
}

/// Walk `root` and detect every distribution tree in it.
///
/// Each directory is tried as a raw tree, and each `*.iso` file as an image.
/// Symbolic links are not followed. When two trees map to the same prefix the
/// first one found wins.
pub fn discover(root: &Path, cascade: &DetectionCascade) -> Vec<Mount> {
    info!(root = %root.display(), "Searching for distributions");
    let mut mounts: Vec<Mount> = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path");
                continue;
            }
        };

        let tree: Arc<dyn Tree> = if entry.file_type().is_dir() {
            Arc::new(RawTree::new(entry.path()))
        } else if entry.file_type().is_file() && is_image(entry.path()) {
            match ArchiveTree::open(entry.path()) {
                Ok(tree) => Arc::new(tree),
                Err(e) => {
                    warn!(image = %entry.path().display(), error = %e, "Skipping unreadable image");
                    continue;
                }
            }
        } else {
            continue;
        };

        let Some(prefix) = mount_prefix(root, entry.path(), !entry.file_type().is_dir()) else {
            continue;
        };
        let Some(distro) = cascade.detect(tree) else {
            continue;
        };
        if mounts.iter().any(|mount| mount.prefix == prefix) {
            warn!(
                prefix = %prefix,
                path = %entry.path().display(),
                "Prefix already in use, skipping distribution"
            );
            continue;
        }

        info!(
            name = %distro.name(),
            version = %distro.version(),
            kind = distro.kind().id(),
            prefix = %prefix,
            "Found distribution"
        );
        mounts.push(Mount::new(prefix, distro));
    }

    debug!(count = mounts.len(), "Discovery finished");
    mounts
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("iso"))
}

/// URL prefix for the tree at `path`; images lose their extension.
fn mount_prefix(root: &Path, path: &Path, is_image: bool) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let relative = if is_image {
        relative.with_extension("")
    } else {
        relative.to_path_buf()
    };
    let segments: Option<Vec<&str>> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect();
    Some(segments?.join("/"))
}
