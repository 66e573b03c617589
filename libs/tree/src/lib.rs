//! Uniform access to distribution trees.
//!
//! A distribution is served either from an unpacked directory or straight
//! out of an ISO9660 image. Both are exposed through the [`Tree`] trait:
//!
//! - **RawTree**: a directory on the host filesystem
//! - **ArchiveTree**: the contents of an ISO9660 image, read without mounting
//!
//! ```text
//! Tree
//! ├── RawTree ──────── std::fs
//! └── ArchiveTree ──── ArchiveIndex (directory records)
//!                  └── SharedImage ── RangeHandle (per request)
//! ```
//!
//! All paths are relative to the tree root and use `/` separators. A leading
//! `/`, empty segments and `.` segments are ignored; `..` never resolves.

mod archive;
mod content_type;
mod error;
mod glob;
pub mod iso9660;
mod range;
mod raw;

use std::fmt;
use std::path::Path;
use std::time::SystemTime;

pub use archive::ArchiveTree;
pub use content_type::guess_content_type;
pub use error::{Result, TreeError};
pub use iso9660::{ArchiveEntry, ArchiveIndex, Naming};
pub use range::{RangeHandle, SharedImage};
pub use raw::RawTree;

/// Backing storage of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Raw,
    Archive,
}

/// An open byte range over one file, ready to stream.
#[derive(Debug)]
pub struct RangeFile {
    pub handle: RangeHandle,
    pub size: u64,
    pub content_type: &'static str,
}

/// Read-only view of a directory tree.
///
/// Implementations are shared across request handlers, so every method
/// takes `&self` and must be safe to call concurrently.
pub trait Tree: Send + Sync + fmt::Debug {
    /// Directory path or image path identifying the tree.
    fn root(&self) -> &Path;

    fn kind(&self) -> TreeKind;

    /// Last modification time of the tree as a whole.
    fn modified(&self) -> SystemTime;

    /// Whether anything exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Whether `path` is a directory.
    fn is_dir(&self, path: &str) -> Result<bool>;

    /// Whether `path` is a symbolic link.
    fn is_symlink(&self, path: &str) -> Result<bool> {
        let _ = path;
        Ok(false)
    }

    /// Names of the entries directly inside the directory at `path`.
    fn list(&self, path: &str) -> Result<Vec<String>>;

    /// Read a whole (small) file.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Whether [`Tree::open_range`] is supported.
    fn serves_files(&self) -> bool {
        false
    }

    /// Open a streaming range over the whole file at `path`.
    ///
    /// Fails with [`TreeError::NotFound`] for a missing path and
    /// [`TreeError::IsADirectory`] for a directory.
    fn open_range(&self, path: &str) -> Result<RangeFile> {
        let _ = path;
        Err(TreeError::Unsupported("open_range"))
    }

    /// Paths matching `pattern`, sorted.
    ///
    /// Each `/`-separated segment of the pattern may use `*` and `?`.
    /// Wildcards do not match a leading `.`.
    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        glob::glob(self, pattern)
    }
}

/// Split a tree path into its segments.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(TreeError::NotFound(path.to_string())),
            _ => segments.push(segment),
        }
    }
    Ok(segments)
}
