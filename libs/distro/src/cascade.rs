//! Most-specific-first distribution detection.

use std::collections::HashSet;
use std::sync::Arc;

use osboot_tree::Tree;
use tracing::debug;

use crate::debian::{Debian, DebianLive};
use crate::error::DistroError;
use crate::kind::{Distro, DistroKind};
use crate::redhat::RedHat;
use crate::ubuntu::{Ubuntu, UbuntuLive, UbuntuNetboot};

/// Kinds ordered so that every kind precedes its parent.
#[derive(Debug, Clone)]
pub struct DetectionCascade {
    order: Vec<Arc<dyn DistroKind>>,
}

/// The kinds osboot ships with, in registration order.
pub fn standard_kinds() -> Vec<Arc<dyn DistroKind>> {
    vec![
        Arc::new(Debian),
        Arc::new(DebianLive),
        Arc::new(Ubuntu),
        Arc::new(UbuntuNetboot),
        Arc::new(UbuntuLive),
        Arc::new(RedHat),
    ]
}

impl DetectionCascade {
    /// Validate `kinds` and order them depth-first, children before parents.
    ///
    /// Siblings keep their registration order.
    pub fn new(kinds: Vec<Arc<dyn DistroKind>>) -> Result<Self, DistroError> {
        validate(&kinds)?;
        Ok(Self {
            order: depth_first(&kinds),
        })
    }

    /// Cascade over [`standard_kinds`].
    pub fn standard() -> Self {
        Self {
            order: depth_first(&standard_kinds()),
        }
    }

    /// Kind ids in the order they are tried.
    pub fn order(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().map(|kind| kind.id())
    }

    /// The most specific kind matching `tree`.
    pub fn classify(&self, tree: &dyn Tree) -> Option<Arc<dyn DistroKind>> {
        let found = self.order.iter().find(|kind| kind.detect(tree)).cloned();
        debug!(
            root = %tree.root().display(),
            kind = found.as_ref().map(|kind| kind.id()),
            "Classified tree"
        );
        found
    }

    /// Every kind matching `tree`, most specific first.
    pub fn matches(&self, tree: &dyn Tree) -> Vec<&'static str> {
        self.order
            .iter()
            .filter(|kind| kind.detect(tree))
            .map(|kind| kind.id())
            .collect()
    }

    /// Bind `tree` to its most specific kind.
    pub fn detect(&self, tree: Arc<dyn Tree>) -> Option<Distro> {
        let kind = self.classify(tree.as_ref())?;
        Some(Distro::new(kind, tree))
    }
}

impl Default for DetectionCascade {
    fn default() -> Self {
        Self::standard()
    }
}

fn validate(kinds: &[Arc<dyn DistroKind>]) -> Result<(), DistroError> {
    let mut ids = HashSet::new();
    for kind in kinds {
        if !ids.insert(kind.id()) {
            return Err(DistroError::DuplicateKind(kind.id()));
        }
    }

    let parent_of = |id: &str| {
        kinds
            .iter()
            .find(|kind| kind.id() == id)
            .and_then(|kind| kind.parent())
    };
    for kind in kinds {
        if let Some(parent) = kind.parent() {
            if !ids.contains(parent) {
                return Err(DistroError::UnknownParent {
                    id: kind.id(),
                    parent,
                });
            }
        }

        // A chain longer than the number of kinds must revisit one.
        let mut current = kind.parent();
        for _ in 0..kinds.len() {
            match current {
                Some(id) if id == kind.id() => return Err(DistroError::Cycle(kind.id())),
                Some(id) => current = parent_of(id),
                None => break,
            }
        }
    }
    Ok(())
}

fn depth_first(kinds: &[Arc<dyn DistroKind>]) -> Vec<Arc<dyn DistroKind>> {
    fn visit(
        parent: &'static str,
        kinds: &[Arc<dyn DistroKind>],
        order: &mut Vec<Arc<dyn DistroKind>>,
    ) {
        for child in kinds.iter().filter(|kind| kind.parent() == Some(parent)) {
            visit(child.id(), kinds, order);
            order.push(Arc::clone(child));
        }
    }

    let mut order = Vec::with_capacity(kinds.len());
    for root in kinds.iter().filter(|kind| kind.parent().is_none()) {
        visit(root.id(), kinds, &mut order);
        order.push(Arc::clone(root));
    }
    order
}
