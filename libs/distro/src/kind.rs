//! Distribution kinds and detected distributions.

use std::fmt;
use std::sync::{Arc, OnceLock};

use osboot_tree::Tree;
use tracing::debug;

use crate::error::DistroError;
use crate::manifest::Manifest;

/// Builds absolute URLs for files of the tree being rendered.
pub trait UrlBuilder {
    /// Absolute URL of `path` relative to the tree's mount point.
    ///
    /// An empty `path` yields the mount point itself, with a trailing `/`.
    fn file_url(&self, path: &str) -> String;
}

/// An iPXE script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootScript(String);

impl BootScript {
    /// Join `lines` with a `\n` after each, starting with `#!ipxe`.
    pub fn ipxe<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut script = String::from("#!ipxe\n");
        for line in lines {
            script.push_str(line.as_ref());
            script.push('\n');
        }
        Self(script)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BootScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recognizable family of distribution trees.
///
/// Kinds form a specialization graph through [`DistroKind::parent`]; the
/// cascade always tries a kind before its parent.
pub trait DistroKind: Send + Sync + fmt::Debug {
    /// Stable identifier, e.g. `debian-live`.
    fn id(&self) -> &'static str;

    /// Id of the more general kind this one refines.
    fn parent(&self) -> Option<&'static str> {
        None
    }

    /// Whether `tree` looks like this kind. Pure in the tree's contents.
    fn detect(&self, tree: &dyn Tree) -> bool;

    /// Read this kind's metadata file from `tree`.
    fn read_manifest(&self, tree: &dyn Tree) -> Manifest;

    /// Render the boot script, or `None` when this kind cannot be booted.
    fn boot_script(
        &self,
        distro: &Distro,
        urls: &dyn UrlBuilder,
    ) -> Result<Option<BootScript>, DistroError> {
        let _ = (distro, urls);
        Ok(None)
    }
}

/// A tree bound to the kind it was detected as.
#[derive(Debug)]
pub struct Distro {
    kind: Arc<dyn DistroKind>,
    tree: Arc<dyn Tree>,
    manifest: OnceLock<Manifest>,
}

impl Distro {
    pub fn new(kind: Arc<dyn DistroKind>, tree: Arc<dyn Tree>) -> Self {
        Self {
            kind,
            tree,
            manifest: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> &dyn DistroKind {
        self.kind.as_ref()
    }

    pub fn tree(&self) -> &Arc<dyn Tree> {
        &self.tree
    }

    /// Metadata, read from the tree on first use.
    pub fn manifest(&self) -> &Manifest {
        self.manifest.get_or_init(|| {
            debug!(
                kind = self.kind.id(),
                root = %self.tree.root().display(),
                "Reading distribution manifest"
            );
            self.kind.read_manifest(self.tree.as_ref())
        })
    }

    pub fn name(&self) -> &str {
        self.manifest().name()
    }

    pub fn version(&self) -> &str {
        self.manifest().version()
    }

    pub fn boot_script(&self, urls: &dyn UrlBuilder) -> Result<Option<BootScript>, DistroError> {
        self.kind.boot_script(self, urls)
    }
}

/// Read a metadata file as text; missing or unreadable files read as empty.
pub(crate) fn read_text(tree: &dyn Tree, path: &str) -> String {
    match tree.read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(error) => {
            debug!(
                root = %tree.root().display(),
                path,
                error = %error,
                "Metadata file unreadable, using empty contents"
            );
            String::new()
        }
    }
}
