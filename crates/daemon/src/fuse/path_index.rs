//! Path index built from the remote object graph
//!
//! The remote store is a flat set of objects pointing at their parents by id.
//! [`PathIndex`] turns one full listing of that graph into a strict tree of
//! unique paths:
//!
//! - The first parent in an entry's parent list decides its path. An entry
//!   with no parents sits directly under the root.
//! - Entries whose parent chain loops or ends at an unknown id are left out.
//! - Entries whose name cannot be a path segment (empty, `.`, `..`, contains
//!   `/`) are left out together with everything below them.
//! - When siblings share a name, the most recently modified one keeps the
//!   path (the one listed last on a tie) and the others, with their subtrees,
//!   are left out. Uploading over an existing path therefore shadows the
//!   older object.
//!
//! The index is never patched incrementally; a rebuild lists the whole store
//! again and the result replaces the previous index wholesale.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use common::path;
use common::{EntryKind, ListQuery, RemoteEntry, RemoteError, RemoteStore, ROOT_SENTINEL};

/// One child in a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Canonical path → remote entry. The root itself is never a key.
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    entries: HashMap<String, RemoteEntry>,
}

impl PathIndex {
    /// An index with nothing but the implicit root
    pub fn empty() -> Self {
        Self::default()
    }

    /// List the whole store and build a fresh index from it.
    ///
    /// Any failed page fails the whole rebuild; no partial index is returned.
    pub async fn rebuild(store: &dyn RemoteStore) -> Result<Self, RemoteError> {
        let entries = Self::fetch_all(store).await?;
        Ok(Self::build(entries, &store.root_id()))
    }

    /// Follow page tokens until the store reports no further pages
    pub async fn fetch_all(store: &dyn RemoteStore) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut entries = Vec::new();
        let mut page_token = None;
        let mut pages = 0usize;

        loop {
            let page = store
                .list_page(ListQuery::AllNonDeleted, page_token.take())
                .await?;
            pages += 1;
            entries.extend(page.entries);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(pages, entries = entries.len(), "fetched remote listing");
        Ok(entries)
    }

    /// Build an index from a flat listing.
    ///
    /// `root_id` is the store's concrete root id; parents equal to it or to
    /// the `"root"` sentinel resolve to the root.
    pub fn build(listing: Vec<RemoteEntry>, root_id: &str) -> Self {
        let mut resolver = Resolver::new(&listing, root_id);

        // Resolve every entry's raw path first so sibling collisions can be
        // settled independent of resolution order.
        let mut claims: HashMap<String, &RemoteEntry> = HashMap::new();
        for entry in &listing {
            if resolver.is_root(&entry.id) {
                continue;
            }
            if let Some(path) = resolver.resolve(&entry.id) {
                match claims.entry(path) {
                    Entry::Occupied(mut slot) => {
                        if entry.modified_at >= slot.get().modified_at {
                            slot.insert(entry);
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(entry);
                    }
                }
            }
        }
        let winners: HashMap<String, &str> = claims
            .into_iter()
            .map(|(path, entry)| (path, entry.id.as_str()))
            .collect();

        let mut entries = HashMap::with_capacity(winners.len());
        let mut excluded = 0usize;
        for entry in &listing {
            if resolver.is_root(&entry.id) {
                continue;
            }
            if !resolver.is_canonical(&entry.id, &winners) {
                excluded += 1;
                continue;
            }
            if let Some(Some(path)) = resolver.paths.get(entry.id.as_str()) {
                if let Entry::Vacant(slot) = entries.entry(path.clone()) {
                    slot.insert(entry.clone());
                }
            }
        }

        if excluded > 0 {
            tracing::debug!(
                excluded,
                "left out entries with cyclic, dangling, duplicate or unrepresentable paths"
            );
        }

        Self { entries }
    }

    /* Getters */

    pub fn get(&self, path: &str) -> Option<&RemoteEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Immediate children of `dir`, sorted by name. Deeper descendants are
    /// not included.
    pub fn children(&self, dir: &str) -> Vec<DirEntry> {
        let mut children: Vec<DirEntry> = self
            .entries
            .iter()
            .filter(|(key, _)| path::is_descendant(key, dir) && path::parent(key) == dir)
            .map(|(key, entry)| DirEntry {
                name: path::base_name(key).to_string(),
                kind: entry.kind,
            })
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    /* Mutations */

    /// Move `old` and everything below it to `new`.
    ///
    /// Returns the `(old, new)` pairs that moved, parents before children.
    /// An existing key at a destination is replaced.
    pub fn rename(&mut self, old: &str, new: &str) -> Vec<(String, String)> {
        let mut moved: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.as_str() == old || path::is_descendant(key, old))
            .cloned()
            .collect();
        moved.sort_by_key(|key| key.len());

        let mut pairs = Vec::with_capacity(moved.len());
        for from in moved {
            if let Some(entry) = self.entries.remove(&from) {
                let to = format!("{}{}", new, &from[old.len()..]);
                self.entries.insert(to.clone(), entry);
                pairs.push((from, to));
            }
        }
        pairs
    }
}

/// Iterative first-parent path resolution with per-chain cycle detection
struct Resolver<'a> {
    by_id: HashMap<&'a str, &'a RemoteEntry>,
    root_id: &'a str,
    /// id → resolved path, `None` once known unresolvable
    paths: HashMap<&'a str, Option<String>>,
    /// id → whether the entry and all its ancestors own their paths
    canonical: HashMap<&'a str, bool>,
}

impl<'a> Resolver<'a> {
    fn new(listing: &'a [RemoteEntry], root_id: &'a str) -> Self {
        let mut by_id = HashMap::with_capacity(listing.len());
        for entry in listing {
            // A listing can repeat an id across pages; the first copy wins.
            by_id.entry(entry.id.as_str()).or_insert(entry);
        }

        Self {
            by_id,
            root_id,
            paths: HashMap::new(),
            canonical: HashMap::new(),
        }
    }

    fn is_root(&self, id: &str) -> bool {
        id == ROOT_SENTINEL || id == self.root_id
    }

    fn resolve(&mut self, id: &'a str) -> Option<String> {
        let mut chain: Vec<&'a RemoteEntry> = Vec::new();
        let mut on_chain: HashSet<&'a str> = HashSet::new();
        let mut cursor = id;

        let mut resolved = loop {
            if self.is_root(cursor) {
                break Some(String::new());
            }
            if let Some(known) = self.paths.get(cursor) {
                break known.clone();
            }
            if !on_chain.insert(cursor) {
                tracing::debug!(id = cursor, "parent cycle detected");
                break None;
            }
            match self.by_id.get(cursor) {
                Some(&entry) if path::is_valid_segment(&entry.name) => {
                    chain.push(entry);
                    cursor = entry.primary_parent();
                }
                _ => break None,
            }
        };

        while let Some(entry) = chain.pop() {
            resolved = resolved.map(|parent| path::join(&parent, &entry.name));
            self.paths.insert(entry.id.as_str(), resolved.clone());
        }

        resolved
    }

    /// An entry is kept when it won its path and so did every ancestor
    fn is_canonical(&mut self, id: &'a str, winners: &HashMap<String, &str>) -> bool {
        let mut chain: Vec<&'a str> = Vec::new();
        let mut cursor = id;

        let canonical = loop {
            if self.is_root(cursor) {
                break true;
            }
            if let Some(&known) = self.canonical.get(cursor) {
                break known;
            }
            chain.push(cursor);

            let owns_path = match self.paths.get(cursor) {
                Some(Some(path)) => winners.get(path) == Some(&cursor),
                _ => false,
            };
            if !owns_path {
                break false;
            }
            match self.by_id.get(cursor) {
                Some(&entry) => cursor = entry.primary_parent(),
                None => break false,
            }
        };

        for id in chain {
            self.canonical.insert(id, canonical);
        }
        canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scenario() -> Vec<RemoteEntry> {
        vec![
            RemoteEntry::folder("1", "docs", &[]),
            RemoteEntry::file("2", "a.txt", 5, &["1"]),
        ]
    }

    #[test]
    fn test_scenario_paths() {
        let index = PathIndex::build(scenario(), "root");

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("docs").unwrap().id, "1");
        assert_eq!(index.get("docs/a.txt").unwrap().id, "2");
        assert!(!index.contains(""));
    }

    #[test]
    fn test_children_are_one_level_deep() {
        let mut listing = scenario();
        listing.push(RemoteEntry::folder("3", "sub", &["1"]));
        listing.push(RemoteEntry::file("4", "deep.txt", 1, &["3"]));
        let index = PathIndex::build(listing, "root");

        let names: Vec<String> = index.children("docs").into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a.txt", "sub"]);

        let root: Vec<String> = index.children("").into_iter().map(|c| c.name).collect();
        assert_eq!(root, vec!["docs"]);
    }

    #[test]
    fn test_first_parent_wins_and_is_stable() {
        let listing = vec![
            RemoteEntry::folder("A", "alpha", &[]),
            RemoteEntry::folder("B", "beta", &[]),
            RemoteEntry::file("X", "shared.txt", 1, &["A", "B"]),
        ];

        let first = PathIndex::build(listing.clone(), "root");
        let second = PathIndex::build(listing, "root");

        assert_eq!(first.get("alpha/shared.txt").unwrap().id, "X");
        assert!(!first.contains("beta/shared.txt"));
        assert_eq!(second.get("alpha/shared.txt").unwrap().id, "X");
    }

    #[test]
    fn test_cycles_are_excluded() {
        let listing = vec![
            RemoteEntry::folder("X", "x", &["Y"]),
            RemoteEntry::folder("Y", "y", &["X"]),
            RemoteEntry::file("Z", "inside.txt", 1, &["X"]),
            RemoteEntry::file("ok", "ok.txt", 1, &[]),
        ];
        let index = PathIndex::build(listing, "root");

        assert_eq!(index.len(), 1);
        assert!(index.contains("ok.txt"));
    }

    #[test]
    fn test_self_parent_is_excluded() {
        let listing = vec![RemoteEntry::folder("S", "self", &["S"])];
        assert!(PathIndex::build(listing, "root").is_empty());
    }

    #[test]
    fn test_dangling_parent_is_excluded() {
        let listing = vec![
            RemoteEntry::file("O", "orphan.txt", 1, &["missing"]),
            RemoteEntry::file("K", "kept.txt", 1, &["root"]),
        ];
        let index = PathIndex::build(listing, "root");

        assert!(!index.paths().any(|p| p.ends_with("orphan.txt")));
        assert!(index.contains("kept.txt"));
    }

    #[test]
    fn test_concrete_root_id_resolves_to_root() {
        let listing = vec![
            RemoteEntry::folder("0ABCroot", "My Drive", &[]),
            RemoteEntry::file("f", "a.txt", 1, &["0ABCroot"]),
        ];
        let index = PathIndex::build(listing, "0ABCroot");

        assert!(index.contains("a.txt"));
        assert!(!index.contains("My Drive"));
    }

    #[test]
    fn test_duplicate_siblings_last_listed_wins() {
        let listing = vec![
            // the child is listed before either duplicate folder
            RemoteEntry::file("c", "inner.txt", 1, &["second"]),
            RemoteEntry::folder("first", "dup", &[]),
            RemoteEntry::folder("second", "dup", &[]),
            RemoteEntry::file("d", "mine.txt", 1, &["first"]),
        ];
        let index = PathIndex::build(listing, "root");

        assert_eq!(index.get("dup").unwrap().id, "second");
        assert!(index.contains("dup/inner.txt"));
        assert!(!index.contains("dup/mine.txt"));
    }

    #[test]
    fn test_duplicate_siblings_newest_wins() {
        let older = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = chrono::Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let mut fresh = RemoteEntry::file("fresh", "notes.txt", 9, &[]);
        fresh.modified_at = Some(newer);
        let mut stale = RemoteEntry::file("stale", "notes.txt", 3, &[]);
        stale.modified_at = Some(older);

        // newest wins even when listed first
        let index = PathIndex::build(vec![fresh.clone(), stale.clone()], "root");
        assert_eq!(index.get("notes.txt").unwrap().id, "fresh");

        let index = PathIndex::build(vec![stale, fresh], "root");
        assert_eq!(index.get("notes.txt").unwrap().id, "fresh");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_unrepresentable_names_are_excluded() {
        let listing = vec![
            RemoteEntry::folder("s", "a/b", &[]),
            RemoteEntry::file("c", "child.txt", 1, &["s"]),
            RemoteEntry::file("e", "", 1, &[]),
            RemoteEntry::file("dots", "..", 1, &[]),
        ];
        assert!(PathIndex::build(listing, "root").is_empty());
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let mut listing = Vec::new();
        listing.push(RemoteEntry::folder("0", "d0", &[]));
        for i in 1..20_000 {
            let parent = (i - 1).to_string();
            listing.push(RemoteEntry::folder(
                i.to_string(),
                format!("d{}", i),
                &[parent.as_str()],
            ));
        }
        let index = PathIndex::build(listing, "root");
        assert_eq!(index.len(), 20_000);
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut index = PathIndex::build(scenario(), "root");

        let moved = index.rename("docs", "papers");

        assert_eq!(
            moved,
            vec![
                ("docs".to_string(), "papers".to_string()),
                ("docs/a.txt".to_string(), "papers/a.txt".to_string()),
            ]
        );
        assert!(!index.contains("docs"));
        assert_eq!(index.get("papers/a.txt").unwrap().id, "2");
    }

    #[test]
    fn test_rename_missing_path_moves_nothing() {
        let mut index = PathIndex::build(scenario(), "root");
        assert!(index.rename("nope", "other").is_empty());
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_follows_pages() {
        let store = common::memory::MemoryStore::with_page_size(1);
        store.insert_entry(RemoteEntry::folder("1", "docs", &[]));
        store.insert(RemoteEntry::file("2", "a.txt", 5, &["1"]), b"hello".to_vec());

        let index = PathIndex::rebuild(&store).await.unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_fails_on_any_page() {
        let store = common::memory::MemoryStore::with_page_size(1);
        store.insert_entry(RemoteEntry::folder("1", "docs", &[]));
        store.insert(RemoteEntry::file("2", "a.txt", 5, &["1"]), b"hello".to_vec());
        store.fail_pages_from(Some(1));

        assert!(PathIndex::rebuild(&store).await.is_err());
    }
}
