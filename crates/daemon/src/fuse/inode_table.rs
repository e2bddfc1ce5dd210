//! Bidirectional inode ↔ path mapping for the FUSE session
//!
//! The kernel addresses files by 64-bit inode numbers while [`DriveFs`]
//! addresses them by canonical path. Inodes are handed out the first time a
//! path is looked up and are never reused while the session runs, so a stale
//! inode can at worst resolve to `ENOENT`, never to a different file.
//!
//! [`DriveFs`]: super::DriveFs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use common::path;

/// Bidirectional mapping between inodes and canonical paths
#[derive(Debug)]
pub struct InodeTable {
    path_to_inode: HashMap<String, u64>,
    inode_to_path: HashMap<u64, String>,
    /// Next available inode number (starts at 2, as 1 is reserved for root)
    next_inode: AtomicU64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Root inode number (always 1 in FUSE)
    pub const ROOT_INODE: u64 = 1;

    /// Create a new inode table with root pre-registered
    pub fn new() -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            inode_to_path: HashMap::new(),
            next_inode: AtomicU64::new(2),
        };

        table.path_to_inode.insert(String::new(), Self::ROOT_INODE);
        table.inode_to_path.insert(Self::ROOT_INODE, String::new());
        table
    }

    /// Get or create an inode for a path
    pub fn get_or_create(&mut self, path: &str) -> u64 {
        let canonical = path::canonicalize(path);

        if let Some(&inode) = self.path_to_inode.get(&canonical) {
            return inode;
        }

        let inode = self.next_inode.fetch_add(1, Ordering::SeqCst);
        self.path_to_inode.insert(canonical.clone(), inode);
        self.inode_to_path.insert(inode, canonical);
        inode
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(&path::canonicalize(path)).copied()
    }

    pub fn get_path(&self, inode: u64) -> Option<&str> {
        self.inode_to_path.get(&inode).map(String::as_str)
    }

    /// Path of `name` inside the directory with inode `parent`
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        self.get_path(parent).map(|dir| path::join(dir, name))
    }

    /// Move every mapping under `old_path` to `new_path`, keeping inode
    /// numbers. A mapping already at a destination path is dropped.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> usize {
        let old = path::canonicalize(old_path);
        let new = path::canonicalize(new_path);
        if old.is_empty() || old == new {
            return 0;
        }

        let moved: Vec<(String, u64)> = self
            .path_to_inode
            .iter()
            .filter(|(p, _)| **p == old || path::is_descendant(p, &old))
            .map(|(p, &inode)| (p.clone(), inode))
            .collect();

        for (from, _) in &moved {
            self.path_to_inode.remove(from);
        }
        for (from, inode) in &moved {
            let to = format!("{}{}", new, &from[old.len()..]);
            if let Some(displaced) = self.path_to_inode.insert(to.clone(), *inode) {
                self.inode_to_path.remove(&displaced);
            }
            self.inode_to_path.insert(*inode, to);
        }

        moved.len()
    }

    pub fn len(&self) -> usize {
        self.inode_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        // root is always present
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_inode() {
        let table = InodeTable::new();
        assert_eq!(table.get_inode("/"), Some(InodeTable::ROOT_INODE));
        assert_eq!(table.get_inode(""), Some(InodeTable::ROOT_INODE));
        assert_eq!(table.get_path(InodeTable::ROOT_INODE), Some(""));
    }

    #[test]
    fn test_get_or_create() {
        let mut table = InodeTable::new();

        let inode1 = table.get_or_create("/foo");
        let inode2 = table.get_or_create("foo");
        let inode3 = table.get_or_create("/bar");

        assert_eq!(inode1, inode2);
        assert_ne!(inode1, inode3);
        assert_ne!(inode1, InodeTable::ROOT_INODE);
        assert_eq!(table.get_path(inode1), Some("foo"));
    }

    #[test]
    fn test_child_path() {
        let mut table = InodeTable::new();
        let docs = table.get_or_create("docs");

        assert_eq!(
            table.child_path(InodeTable::ROOT_INODE, "docs"),
            Some("docs".to_string())
        );
        assert_eq!(table.child_path(docs, "a.txt"), Some("docs/a.txt".to_string()));
        assert_eq!(table.child_path(999, "a.txt"), None);
    }

    #[test]
    fn test_rename() {
        let mut table = InodeTable::new();
        let inode = table.get_or_create("/old");

        assert_eq!(table.rename("/old", "/new"), 1);

        assert!(table.get_inode("/old").is_none());
        assert_eq!(table.get_inode("/new"), Some(inode));
        assert_eq!(table.get_path(inode), Some("new"));
    }

    #[test]
    fn test_rename_subtree_keeps_inodes() {
        let mut table = InodeTable::new();
        let dir = table.get_or_create("docs");
        let file = table.get_or_create("docs/a.txt");
        let sibling = table.get_or_create("docsx");

        assert_eq!(table.rename("docs", "papers"), 2);

        assert_eq!(table.get_path(dir), Some("papers"));
        assert_eq!(table.get_path(file), Some("papers/a.txt"));
        assert_eq!(table.get_path(sibling), Some("docsx"));
    }

    #[test]
    fn test_rename_over_existing_path() {
        let mut table = InodeTable::new();
        let src = table.get_or_create("a");
        let dst = table.get_or_create("b");

        table.rename("a", "b");

        assert_eq!(table.get_inode("b"), Some(src));
        assert!(table.get_path(dst).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_inodes_never_reused() {
        let mut table = InodeTable::new();
        let first = table.get_or_create("a");
        table.rename("a", "b");
        let second = table.get_or_create("a");

        assert_ne!(first, second);
    }
}
