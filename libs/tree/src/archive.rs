//! ISO9660 image tree.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::warn;

use crate::content_type::guess_content_type;
use crate::error::{Result, TreeError};
use crate::iso9660::{ArchiveEntry, ArchiveIndex};
use crate::range::{RangeHandle, SharedImage};
use crate::{RangeFile, Tree, TreeKind};

/// A distribution tree read directly out of an ISO9660 image.
///
/// The image is opened once; concurrent readers share its descriptor
/// through [`RangeHandle`]s.
#[derive(Debug)]
pub struct ArchiveTree {
    root: PathBuf,
    image: Arc<SharedImage>,
    index: ArchiveIndex,
}

impl ArchiveTree {
    /// Open the image at `path` and read its volume descriptors.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        let image = Arc::new(SharedImage::open(&root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TreeError::NotFound(root.display().to_string()),
            _ => TreeError::Io(e),
        })?);
        let index = ArchiveIndex::open(Arc::clone(&image))?;
        Ok(Self { root, image, index })
    }

    /// Directory index of the image.
    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    /// The shared image handle.
    pub fn image(&self) -> &Arc<SharedImage> {
        &self.image
    }

    /// Look up `path`, reporting undecodable records as missing.
    fn lookup(&self, path: &str) -> Result<ArchiveEntry> {
        normalize(self.index.locate(path), &self.root, path)
    }

    fn lookup_file(&self, path: &str) -> Result<ArchiveEntry> {
        let entry = self.lookup(path)?;
        if entry.is_dir {
            return Err(TreeError::IsADirectory(path.to_string()));
        }
        Ok(entry)
    }
}

fn normalize<T>(result: Result<T>, image: &Path, path: &str) -> Result<T> {
    match result {
        Err(TreeError::Malformed { path: at, reason }) => {
            warn!(
                image = %image.display(),
                path = %at,
                reason = %reason,
                "Malformed directory record, treating as not found"
            );
            Err(TreeError::NotFound(path.to_string()))
        }
        other => other,
    }
}

impl Tree for ArchiveTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn kind(&self) -> TreeKind {
        TreeKind::Archive
    }

    fn modified(&self) -> SystemTime {
        self.image.modified()
    }

    fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_ok()
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(self.lookup(path)?.is_dir)
    }

    fn list(&self, path: &str) -> Result<Vec<String>> {
        let mut names = normalize(self.index.list(path), &self.root, path)?;
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let entry = self.lookup_file(path)?;
        let size = usize::try_from(entry.size).map_err(|_| {
            TreeError::Io(io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("{path} is too large to read whole"),
            ))
        })?;
        let read = self
            .image
            .read_vec_at(entry.offset(self.index.block_size()), size)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => TreeError::malformed(path, e.to_string()),
                _ => TreeError::Io(e),
            });
        normalize(read, &self.root, path)
    }

    fn serves_files(&self) -> bool {
        true
    }

    fn open_range(&self, path: &str) -> Result<RangeFile> {
        let entry = self.lookup_file(path)?;
        let handle = RangeHandle::open(
            Arc::clone(&self.image),
            entry.offset(self.index.block_size()),
            entry.size,
        )?;
        Ok(RangeFile {
            handle,
            size: entry.size,
            content_type: guess_content_type(path),
        })
    }
}
