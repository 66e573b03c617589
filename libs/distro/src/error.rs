//! Distribution error types.

use osboot_tree::TreeError;
use thiserror::Error;

/// Errors raised while registering kinds or rendering boot scripts.
#[derive(Debug, Error)]
pub enum DistroError {
    /// A kind names a parent that was never registered.
    #[error("distribution kind {id} has unknown parent {parent}")]
    UnknownParent {
        id: &'static str,
        parent: &'static str,
    },

    /// Two kinds share an id.
    #[error("distribution kind {0} registered more than once")]
    DuplicateKind(&'static str),

    /// Parent links loop back on themselves.
    #[error("distribution kind {0} is its own ancestor")]
    Cycle(&'static str),

    /// Reading the tree failed while rendering.
    #[error(transparent)]
    Tree(#[from] TreeError),
}
