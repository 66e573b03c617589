//! Tree error types.

use std::io;

use thiserror::Error;

/// Result alias for tree operations.
pub type Result<T, E = TreeError> = std::result::Result<T, E>;

/// Errors raised by tree lookups and reads.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The path does not exist in the tree.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path names a directory where a file was required.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The path names a file where a directory was required.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A directory record inside the image could not be decoded.
    ///
    /// Never escapes a [`Tree`](crate::Tree) implementation; archive trees
    /// report it as [`TreeError::NotFound`].
    #[error("malformed archive entry at {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// The file is not a readable ISO9660 image.
    #[error("invalid image {path}: {reason}")]
    InvalidImage { path: String, reason: String },

    /// The operation is not offered by this kind of tree.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Underlying storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TreeError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that mean "nothing at this path".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
