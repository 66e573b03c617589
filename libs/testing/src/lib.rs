//! Test fixtures for osboot.
//!
//! - [`IsoBuilder`] writes small ISO9660 images with Rock Ridge or Joliet names
//! - [`MemoryTree`] is a [`Tree`](osboot_tree::Tree) held in memory
//! - [`TreeDir`] lays out an unpacked tree in a temporary directory

mod iso;
mod memory;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub use iso::IsoBuilder;
pub use memory::MemoryTree;

/// An unpacked tree in a temporary directory, removed on drop.
#[derive(Debug)]
pub struct TreeDir {
    dir: TempDir,
}

impl TreeDir {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `relative` inside the directory.
    pub fn join(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a file, creating parent directories.
    pub fn file(&self, relative: &str, contents: impl AsRef<[u8]>) -> io::Result<&Self> {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(self)
    }

    /// Create a directory and its parents.
    pub fn dir(&self, relative: &str) -> io::Result<&Self> {
        fs::create_dir_all(self.join(relative))?;
        Ok(self)
    }

    /// Write `image` to `relative`, creating parent directories.
    pub fn iso(&self, relative: &str, image: &IsoBuilder) -> io::Result<&Self> {
        self.file(relative, image.build())
    }
}
