//! Raw filesystem tree.
//!
//! Every lookup maps directly onto a filesystem call below `root`. Raw trees
//! do not stream ranges; their files are served by a static file service.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Result, TreeError};
use crate::{Tree, TreeKind};

/// A distribution tree unpacked on the host filesystem.
#[derive(Debug, Clone)]
pub struct RawTree {
    root: PathBuf,
}

impl RawTree {
    /// Create a tree rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a tree path to a host path below the root.
    ///
    /// `..` segments are refused, so the result never leaves the root
    /// lexically.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut full = self.root.clone();
        for segment in crate::split_path(path)? {
            full.push(segment);
        }
        Ok(full)
    }

    fn metadata(&self, path: &str) -> Result<fs::Metadata> {
        let full = self.resolve(path)?;
        fs::metadata(&full).map_err(|e| io_error(e, path))
    }
}

fn io_error(err: io::Error, path: &str) -> TreeError {
    match err.kind() {
        io::ErrorKind::NotFound => TreeError::NotFound(path.to_string()),
        _ => TreeError::Io(err),
    }
}

impl Tree for RawTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn kind(&self) -> TreeKind {
        TreeKind::Raw
    }

    fn modified(&self) -> SystemTime {
        fs::metadata(&self.root)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn exists(&self, path: &str) -> bool {
        self.metadata(path).is_ok()
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(self.metadata(path)?.is_dir())
    }

    fn is_symlink(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        let metadata = fs::symlink_metadata(&full).map_err(|e| io_error(e, path))?;
        Ok(metadata.file_type().is_symlink())
    }

    fn list(&self, path: &str) -> Result<Vec<String>> {
        let metadata = self.metadata(path)?;
        if !metadata.is_dir() {
            return Err(TreeError::NotADirectory(path.to_string()));
        }
        let full = self.resolve(path)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| io_error(e, path))? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        if self.is_dir(path)? {
            return Err(TreeError::IsADirectory(path.to_string()));
        }
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| io_error(e, path))
    }
}
