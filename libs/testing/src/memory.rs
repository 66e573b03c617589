//! In-memory [`Tree`] for tests that do not need real images.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use osboot_tree::{Result, Tree, TreeError, TreeKind};

#[derive(Debug, Clone)]
enum Entry {
    File(Vec<u8>),
    Directory,
}

/// A tree held entirely in memory.
///
/// Parent directories of every inserted file are created implicitly. Paths
/// are normalized the same way the real trees normalize them.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    root: PathBuf,
    modified: SystemTime,
    entries: BTreeMap<String, Entry>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(String::new(), Entry::Directory);
        Self {
            root: PathBuf::from("memory"),
            modified: SystemTime::UNIX_EPOCH,
            entries,
        }
    }

    /// Set the path reported by [`Tree::root`].
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the time reported by [`Tree::modified`].
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = modified;
        self
    }

    /// Add a file and its parent directories.
    pub fn file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        let path = normalize(path);
        self.add_parents(&path);
        self.entries.insert(path, Entry::File(contents.into()));
        self
    }

    /// Add an empty directory and its parents.
    pub fn dir(mut self, path: &str) -> Self {
        let path = normalize(path);
        self.add_parents(&path);
        self.entries.insert(path, Entry::Directory);
        self
    }

    fn add_parents(&mut self, path: &str) {
        let mut end = 0;
        while let Some(offset) = path[end..].find('/') {
            end += offset;
            self.entries
                .insert(path[..end].to_string(), Entry::Directory);
            end += 1;
        }
    }

    fn entry(&self, path: &str) -> Result<&Entry> {
        let key = normalize(path);
        if key.split('/').any(|segment| segment == "..") {
            return Err(TreeError::NotFound(path.to_string()));
        }
        self.entries
            .get(&key)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl Tree for MemoryTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn kind(&self) -> TreeKind {
        TreeKind::Raw
    }

    fn modified(&self) -> SystemTime {
        self.modified
    }

    fn exists(&self, path: &str) -> bool {
        self.entry(path).is_ok()
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(matches!(self.entry(path)?, Entry::Directory))
    }

    fn list(&self, path: &str) -> Result<Vec<String>> {
        if !self.is_dir(path)? {
            return Err(TreeError::NotADirectory(path.to_string()));
        }
        let prefix = match normalize(path) {
            dir if dir.is_empty() => dir,
            dir => format!("{dir}/"),
        };
        Ok(self
            .entries
            .keys()
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        match self.entry(path)? {
            Entry::File(data) => Ok(data.clone()),
            Entry::Directory => Err(TreeError::IsADirectory(path.to_string())),
        }
    }
}
