//! Shared image handle and per-request byte-range readers.
//!
//! An image is opened once and shared by every request that streams from it.
//! Each request gets a [`RangeHandle`] holding its own duplicate of the
//! image's descriptor. Duplicated descriptors share one kernel file offset,
//! so every handle keeps its own cursor and performs seek+read while holding
//! the image-wide lock.
//!
//! ```text
//! SharedImage (File + Mutex)
//! ├── RangeHandle (dup fd, start, length, cursor)   request A
//! └── RangeHandle (dup fd, start, length, cursor)   request B
//! ```

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tracing::trace;

/// One open image file plus the lock serializing positioned reads on it.
#[derive(Debug)]
pub struct SharedImage {
    path: PathBuf,
    file: File,
    lock: Mutex<()>,
    len: u64,
    modified: SystemTime,
}

impl SharedImage {
    /// Open an image file for shared positioned reads.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        Ok(Self {
            path,
            len: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            file,
            lock: Mutex::new(()),
        })
    }

    /// Path the image was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the image in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Modification time of the image file at open.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Fill `buf` from absolute offset `pos` using the image's own descriptor.
    pub fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.locked_read(&self.file, pos + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "image {} ends before offset {}",
                        self.path.display(),
                        pos + buf.len() as u64
                    ),
                ));
            }
            filled += n;
        }
        Ok(())
    }

    /// Read `len` bytes from absolute offset `pos`.
    ///
    /// Ranges past the end of the image fail before anything is allocated.
    pub fn read_vec_at(&self, pos: u64, len: usize) -> io::Result<Vec<u8>> {
        let end = pos.checked_add(len as u64);
        if end.is_none_or(|end| end > self.len) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "range of {len} bytes at {pos} exceeds image {} of {} bytes",
                    self.path.display(),
                    self.len
                ),
            ));
        }
        let mut buf = vec![0u8; len];
        self.read_exact_at(pos, &mut buf)?;
        Ok(buf)
    }

    /// Seek `file` to `pos` and read into `buf`, atomically with respect to
    /// every other descriptor of this image.
    fn locked_read(&self, file: &File, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        // The guard protects no data, so a poisoned lock is still usable.
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = file;
        file.seek(SeekFrom::Start(pos))?;
        file.read(buf)
    }
}

/// A request-scoped reader over `length` bytes starting at `start`.
///
/// Dropping the handle closes its duplicated descriptor and nothing else.
#[derive(Debug)]
pub struct RangeHandle {
    image: Arc<SharedImage>,
    file: File,
    start: u64,
    length: u64,
    cursor: u64,
}

impl RangeHandle {
    /// Open a handle over `[start, start + length)` of `image`.
    ///
    /// The image descriptor is duplicated, not reopened.
    pub fn open(image: Arc<SharedImage>, start: u64, length: u64) -> io::Result<Self> {
        let end = start.checked_add(length).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "range end overflows")
        })?;
        if end > image.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "range {start}..{end} exceeds image {} of {} bytes",
                    image.path().display(),
                    image.len()
                ),
            ));
        }
        let file = image.file.try_clone()?;
        Ok(Self {
            image,
            file,
            start,
            length,
            cursor: 0,
        })
    }

    /// Absolute offset of the range within the image file.
    ///
    /// Together with the descriptor this lets a transport send the region
    /// directly from the file instead of going through [`Read`].
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Total length of the range.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Bytes left before end of range.
    pub fn remaining(&self) -> u64 {
        self.length - self.cursor
    }

    /// Close the handle, releasing its duplicated descriptor.
    pub fn close(self) {
        drop(self);
    }
}

impl Read for RangeHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cursor == 0 {
            trace!(
                image = %self.image.path().display(),
                start = self.start,
                length = self.length,
                "Buffered range read (no zero-copy path)"
            );
        }
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self
            .image
            .locked_read(&self.file, self.start + self.cursor, &mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "image {} truncated at offset {}",
                    self.image.path().display(),
                    self.start + self.cursor
                ),
            ));
        }
        self.cursor += n as u64;
        Ok(n)
    }
}

#[cfg(unix)]
impl std::os::fd::AsFd for RangeHandle {
    fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        std::os::fd::AsFd::as_fd(&self.file)
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for RangeHandle {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        std::os::fd::AsRawFd::as_raw_fd(&self.file)
    }
}
