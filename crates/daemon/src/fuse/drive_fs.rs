//! Filesystem operations over a remote store
//!
//! [`DriveFs`] owns the path index, the content cache, the open-handle table
//! and the quota snapshot behind a single reader/writer lock. Lookups take the
//! shared side; index installs, cache fills, handle changes and quota
//! replacement take the exclusive side, and only for the in-memory swap.
//! Every call into the remote store runs with the lock released, so a slow
//! download never blocks unrelated operations.
//!
//! Operations take host paths (`/docs/a.txt`) and normalize them to canonical
//! form before touching any state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::runtime::Handle;

use common::path;
use common::{EntryKind, RemoteEntry, RemoteError, RemoteStore};

use super::cache::{CacheStats, ContentCache};
use super::error::FsError;
use super::handle_table::{self, HandleTable};
use super::path_index::{DirEntry, PathIndex};
use super::quota::{QuotaSnapshot, Statfs, DEFAULT_QUOTA_TTL};

/// Permission bits reported for directories
pub const DIR_PERM: u16 = 0o755;
/// Permission bits reported for regular files
pub const FILE_PERM: u16 = 0o644;

/// Tunables for [`DriveFs`]
#[derive(Debug, Clone)]
pub struct DriveFsConfig {
    /// Age after which the quota snapshot is fetched again
    pub quota_ttl: Duration,
    /// Byte capacity of the content cache, `None` for unbounded
    pub cache_max_bytes: Option<u64>,
    /// Where staging files for open write handles are created
    pub staging_dir: PathBuf,
}

impl Default for DriveFsConfig {
    fn default() -> Self {
        Self {
            quota_ttl: DEFAULT_QUOTA_TTL,
            cache_max_bytes: None,
            staging_dir: std::env::temp_dir(),
        }
    }
}

/// Attributes of a path as reported to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub kind: EntryKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub modified: SystemTime,
}

impl Attributes {
    fn directory(modified: SystemTime) -> Self {
        Self {
            kind: EntryKind::Folder,
            size: 0,
            perm: DIR_PERM,
            nlink: 2,
            modified,
        }
    }

    fn file(size: u64, modified: SystemTime) -> Self {
        Self {
            kind: EntryKind::File,
            size,
            perm: FILE_PERM,
            nlink: 1,
            modified,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// What happened to a write session on release
#[derive(Debug)]
pub enum ReleaseOutcome {
    /// No write session was open under the handle
    NotOpen,
    /// The staged content was uploaded as a new remote entry
    Uploaded { id: String },
    /// The upload failed; the staged content is gone
    UploadFailed(RemoteError),
    /// The staging file could not be read back; nothing was uploaded
    StagingUnreadable(std::io::Error),
}

/// The single consistency domain guarded by the lock
#[derive(Debug)]
struct State {
    index: PathIndex,
    /// Bumped on every index install or rename; cache fills from an older
    /// generation are discarded
    generation: u64,
    cache: ContentCache,
    handles: HandleTable,
    quota: QuotaSnapshot,
}

/// Filesystem adapter over a [`RemoteStore`]
pub struct DriveFs {
    store: Arc<dyn RemoteStore>,
    runtime: Handle,
    config: DriveFsConfig,
    state: RwLock<State>,
}

impl std::fmt::Debug for DriveFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("DriveFs")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("indexed", &state.index.len())
            .field("generation", &state.generation)
            .field("open_handles", &state.handles.len())
            .finish()
    }
}

impl DriveFs {
    /// Create an adapter with an empty index.
    ///
    /// `runtime` drives the store's futures. Operations block the calling
    /// thread on it, so they must not be called from inside an async task.
    pub fn new(store: Arc<dyn RemoteStore>, runtime: Handle, config: DriveFsConfig) -> Self {
        let state = State {
            index: PathIndex::empty(),
            generation: 0,
            cache: ContentCache::new(config.cache_max_bytes),
            handles: HandleTable::new(),
            quota: QuotaSnapshot::default(),
        };

        Self {
            store,
            runtime,
            config,
            state: RwLock::new(state),
        }
    }

    /* Index and quota maintenance */

    /// Re-list the whole store and install the new index, clearing the
    /// content cache in the same critical section.
    ///
    /// On failure the previous index and cache stay installed.
    pub fn rebuild_index(&self) -> Result<usize, FsError> {
        let index = self
            .runtime
            .block_on(PathIndex::rebuild(self.store.as_ref()))
            .map_err(FsError::RemoteList)?;
        let indexed = index.len();

        let mut state = self.state.write();
        state.index = index;
        state.generation += 1;
        state.cache.invalidate_all();
        let generation = state.generation;
        drop(state);

        tracing::info!(indexed, generation, "installed path index");
        Ok(indexed)
    }

    /// Fetch the quota if the snapshot is stale. Returns whether a fresh
    /// snapshot was installed; on failure the previous one is kept.
    pub fn refresh_quota(&self) -> bool {
        self.refresh_quota_at(Instant::now())
    }

    pub(crate) fn refresh_quota_at(&self, now: Instant) -> bool {
        if !self.state.read().quota.is_stale(now, self.config.quota_ttl) {
            return false;
        }

        match self.runtime.block_on(self.store.get_quota()) {
            Ok(quota) => {
                tracing::debug!(
                    total = quota.total_bytes,
                    used = quota.used_bytes,
                    "refreshed quota"
                );
                self.state.write().quota = QuotaSnapshot::fetched(quota, now);
                true
            }
            Err(e) => {
                tracing::warn!("failed to refresh quota, keeping previous snapshot: {}", e);
                false
            }
        }
    }

    /* Operations */

    pub fn get_attributes(&self, path: &str) -> Result<Attributes, FsError> {
        let path = path::canonicalize(path);
        if path.is_empty() {
            return Ok(Attributes::directory(UNIX_EPOCH));
        }

        let state = self.state.read();
        if let Some(entry) = state.index.get(&path) {
            let modified = modified_time(entry);
            return Ok(match entry.kind {
                EntryKind::Folder => Attributes::directory(modified),
                EntryKind::File => {
                    let size = state.cache.cached_len(&path).unwrap_or(entry.size_bytes);
                    Attributes::file(size, modified)
                }
            });
        }

        // A file created on this mount but not yet released
        if let Some(pending) = state.handles.pending_for(&path) {
            let size = pending.len()?;
            return Ok(Attributes::file(size, SystemTime::now()));
        }

        Err(FsError::NotFound(path))
    }

    /// List a directory: `.` and `..` followed by its immediate children
    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let path = path::canonicalize(path);
        let state = self.state.read();

        if !path.is_empty() {
            match state.index.get(&path) {
                Some(entry) if entry.is_folder() => {}
                Some(_) => return Err(FsError::NotADirectory(path)),
                None => return Err(FsError::NotFound(path)),
            }
        }

        let mut entries = vec![
            DirEntry {
                name: ".".to_string(),
                kind: EntryKind::Folder,
            },
            DirEntry {
                name: "..".to_string(),
                kind: EntryKind::Folder,
            },
        ];
        entries.extend(state.index.children(&path));
        Ok(entries)
    }

    /// Validate that a path exists. Reads are driven by path, so the null
    /// handle is returned.
    pub fn open(&self, path: &str) -> Result<u64, FsError> {
        let path = path::canonicalize(path);
        if path.is_empty() || self.state.read().index.contains(&path) {
            Ok(HandleTable::NULL_HANDLE)
        } else {
            Err(FsError::NotFound(path))
        }
    }

    /// Whether a path should bypass the host page cache: native documents
    /// report size zero until their export has been fetched.
    pub fn needs_direct_io(&self, path: &str) -> bool {
        let path = path::canonicalize(path);
        let state = self.state.read();
        match state.index.get(&path) {
            Some(entry) => entry.export_format().is_some() && !state.cache.contains(&path),
            None => false,
        }
    }

    /// Copy file content starting at `offset` into `buf`.
    ///
    /// Content is served from the cache, or downloaded in full on a miss and
    /// cached. Returns 0 at or past end of file.
    pub fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        let path = path::canonicalize(path);

        let (entry, generation) = {
            let state = self.state.read();
            if let Some(data) = state.cache.get(&path) {
                return Ok(copy_range(&data, buf, offset));
            }
            let entry = state
                .index
                .get(&path)
                .cloned()
                .ok_or_else(|| FsError::NotFound(path.clone()))?;
            (entry, state.generation)
        };

        // Empty opaque files have nothing to fetch
        if entry.size_bytes == 0 && entry.export_format().is_none() {
            return Ok(0);
        }

        let data = self
            .runtime
            .block_on(self.store.download(&entry))
            .map_err(|e| {
                tracing::warn!(path = %path, id = %entry.id, "download failed: {}", e);
                FsError::Remote(e)
            })?;
        tracing::debug!(path = %path, bytes = data.len(), "downloaded content");

        {
            let state = self.state.write();
            if state.generation == generation {
                state.cache.put(&path, data.clone());
            } else {
                tracing::debug!(path = %path, "index rebuilt during download, not caching");
            }
        }

        Ok(copy_range(&data, buf, offset))
    }

    /// Open a write session for `path` backed by a fresh staging file.
    /// Neither the index nor the remote store is touched until release.
    pub fn create(&self, path: &str) -> Result<u64, FsError> {
        let path = path::canonicalize(path);
        let staging = handle_table::create_staging_file(&self.config.staging_dir).map_err(|e| {
            tracing::warn!(path = %path, "failed to create staging file: {}", e);
            FsError::Io(e)
        })?;

        let handle = self.state.write().handles.open(path.clone(), staging);
        tracing::debug!(path = %path, handle, "opened write session");
        Ok(handle)
    }

    pub fn write(&self, path: &str, data: &[u8], offset: u64, handle: u64) -> Result<usize, FsError> {
        let state = self.state.read();
        let open = state.handles.get(handle).ok_or(FsError::BadHandle(handle))?;
        let written = open.write_at(data, offset).map_err(|e| {
            tracing::warn!(path, handle, "staging write failed: {}", e);
            FsError::Io(e)
        })?;
        Ok(written)
    }

    /// Resize the staging file of an open write session. Without a session
    /// this is a no-op, since hosts call truncate before writing.
    pub fn truncate(&self, path: &str, size: u64, handle: Option<u64>) -> Result<(), FsError> {
        let path = path::canonicalize(path);
        let state = self.state.read();
        let open = handle
            .and_then(|id| state.handles.get(id))
            .or_else(|| state.handles.pending_for(&path));

        match open {
            Some(open) => open.set_len(size)?,
            None => tracing::debug!(path = %path, size, "truncate without write session ignored"),
        }
        Ok(())
    }

    /// Push buffered staging writes to disk. Best effort.
    pub fn flush(&self, path: &str, handle: u64) {
        let state = self.state.read();
        if let Some(open) = state.handles.get(handle) {
            if let Err(e) = open.sync() {
                tracing::warn!(path, handle, "failed to sync staging file: {}", e);
            }
        }
    }

    /// Close a write session and commit it as an upload.
    ///
    /// The upload is attempted once. On success the index is rebuilt before
    /// returning so the new file is visible; on failure the error is logged
    /// and the staged content is dropped. The staging file is deleted on
    /// every path out of this function.
    pub fn release(&self, path: &str, handle: u64) -> ReleaseOutcome {
        let Some(open) = self.state.write().handles.remove(handle) else {
            return ReleaseOutcome::NotOpen;
        };
        let (target, staging) = open.into_parts();

        let outcome = self.commit(&target, &staging);

        let staging_path = staging.to_path_buf();
        if let Err(e) = staging.close() {
            tracing::warn!(path = %staging_path.display(), "failed to remove staging file: {}", e);
        }
        tracing::debug!(path, handle, "released write session");
        outcome
    }

    fn commit(&self, target: &str, staging: &std::path::Path) -> ReleaseOutcome {
        let content = match std::fs::read(staging) {
            Ok(content) => Bytes::from(content),
            Err(e) => {
                tracing::error!(path = %target, "failed to read back staging file: {}", e);
                return ReleaseOutcome::StagingUnreadable(e);
            }
        };

        let parent_id = self.upload_parent_id(target);
        let name = path::base_name(target);
        let bytes = content.len();

        match self
            .runtime
            .block_on(self.store.upload(name, &parent_id, content))
        {
            Ok(entry) => {
                tracing::info!(path = %target, id = %entry.id, bytes, "uploaded file");
                if let Err(e) = self.rebuild_index() {
                    tracing::warn!(path = %target, "index refresh after upload failed: {}", e);
                }
                ReleaseOutcome::Uploaded { id: entry.id }
            }
            Err(e) => {
                tracing::error!(
                    path = %target,
                    bytes,
                    "upload failed, staged content dropped: {}",
                    e
                );
                ReleaseOutcome::UploadFailed(e)
            }
        }
    }

    /// Remote id of the folder an upload to `target` goes into. Unknown
    /// directories fall back to the root.
    fn upload_parent_id(&self, target: &str) -> String {
        let dir = path::parent(target);
        if dir.is_empty() {
            return self.store.root_id();
        }

        match self.state.read().index.get(dir) {
            Some(entry) if entry.is_folder() => entry.id.clone(),
            _ => {
                tracing::debug!(dir, "upload directory not indexed, using root");
                self.store.root_id()
            }
        }
    }

    /// Move a path (and its subtree) in the local index only. The remote
    /// store is not told about the move.
    ///
    /// The destination's parent must be the root or an indexed folder. An
    /// existing destination file is replaced; an existing destination folder
    /// is replaced only by a folder, and only while it is empty.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<Vec<(String, String)>, FsError> {
        let old = path::canonicalize(old_path);
        let new = path::canonicalize(new_path);
        if old.is_empty() || new.is_empty() || path::is_descendant(&new, &old) {
            return Err(FsError::InvalidRename { from: old, to: new });
        }
        if old == new {
            return Ok(Vec::new());
        }

        let mut state = self.state.write();
        let Some(source_is_folder) = state.index.get(&old).map(RemoteEntry::is_folder) else {
            tracing::debug!(from = %old, to = %new, "rename of unindexed path ignored");
            return Ok(Vec::new());
        };

        let new_parent = path::parent(&new);
        if !new_parent.is_empty() {
            match state.index.get(new_parent) {
                Some(entry) if entry.is_folder() => {}
                Some(_) => return Err(FsError::NotADirectory(new_parent.to_string())),
                None => return Err(FsError::NotFound(new_parent.to_string())),
            }
        }

        if let Some(target) = state.index.get(&new) {
            match (source_is_folder, target.is_folder()) {
                (false, true) => return Err(FsError::IsADirectory(new)),
                (true, false) => return Err(FsError::NotADirectory(new)),
                (true, true) if !state.index.children(&new).is_empty() => {
                    return Err(FsError::DirectoryNotEmpty(new))
                }
                _ => {}
            }
        }

        let moved = state.index.rename(&old, &new);
        // downloads started before the move must not fill the old keys
        state.generation += 1;
        for (from, to) in &moved {
            state.cache.invalidate(from);
            state.cache.invalidate(to);
        }
        drop(state);

        tracing::info!(from = %old, to = %new, moved = moved.len(), "renamed locally, remote unchanged");
        Ok(moved)
    }

    pub fn statfs(&self) -> Statfs {
        self.statfs_at(Instant::now())
    }

    pub(crate) fn statfs_at(&self, now: Instant) -> Statfs {
        self.refresh_quota_at(now);
        self.state.read().quota.statfs()
    }

    /// Accepted and ignored
    pub fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        tracing::trace!(path, mode, "chmod ignored");
        Ok(())
    }

    /// Accepted and ignored
    pub fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<(), FsError> {
        tracing::trace!(path, ?uid, ?gid, "chown ignored");
        Ok(())
    }

    /// Accepted and ignored
    pub fn set_times(&self, path: &str) -> Result<(), FsError> {
        tracing::trace!(path, "set_times ignored");
        Ok(())
    }

    /* Getters */

    pub fn cache_stats(&self) -> CacheStats {
        self.state.read().cache.stats()
    }

    pub fn indexed_paths(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn open_handles(&self) -> usize {
        self.state.read().handles.len()
    }
}

fn modified_time(entry: &RemoteEntry) -> SystemTime {
    entry
        .modified_at
        .map(SystemTime::from)
        .unwrap_or(UNIX_EPOCH)
}

/// Copy `min(buf.len(), remaining)` bytes of `data` starting at `offset`
fn copy_range(data: &[u8], buf: &mut [u8], offset: u64) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}
