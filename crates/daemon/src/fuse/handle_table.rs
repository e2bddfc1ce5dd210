//! Open write handles and their staging files
//!
//! Every file created through the mount gets a numeric handle backed by a
//! local temporary file. Writes land in that file; releasing the handle hands
//! the file back so it can be committed as an upload.
//!
//! Handle numbers start at 1 (0 is the null handle returned for read-only
//! opens) and are never reused while the process runs.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::{NamedTempFile, TempPath};

/// Prefix for staging file names
const STAGING_PREFIX: &str = "drivefs-";

/// Create a fresh, empty staging file in `dir`
pub fn create_staging_file(dir: &Path) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)
}

/// One open write session
#[derive(Debug)]
pub struct OpenHandle {
    id: u64,
    target_path: String,
    staging: NamedTempFile,
}

impl OpenHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Canonical path the content will be uploaded to
    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    pub fn staging_path(&self) -> &Path {
        self.staging.path()
    }

    fn file(&self) -> &File {
        self.staging.as_file()
    }

    /// Write the whole buffer at `offset`, extending the file as needed
    pub fn write_at(&self, data: &[u8], offset: u64) -> io::Result<usize> {
        self.file().write_all_at(data, offset)?;
        Ok(data.len())
    }

    pub fn set_len(&self, size: u64) -> io::Result<()> {
        self.file().set_len(size)
    }

    /// Force buffered writes to stable storage
    pub fn sync(&self) -> io::Result<()> {
        self.file().sync_all()
    }

    /// Current length of the staged content
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file().metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Close the writable file and keep only its path. The staging file is
    /// deleted when the returned path is closed or dropped.
    pub fn into_parts(self) -> (String, TempPath) {
        (self.target_path, self.staging.into_temp_path())
    }
}

/// Handle id → open write session
#[derive(Debug)]
pub struct HandleTable {
    handles: HashMap<u64, OpenHandle>,
    /// Next handle number (starts at 1, 0 is the null handle)
    next_handle: AtomicU64,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    /// Handle number returned for opens that carry no write session
    pub const NULL_HANDLE: u64 = 0;

    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Register a staging file for `target_path` and return its new handle
    pub fn open(&mut self, target_path: String, staging: NamedTempFile) -> u64 {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(
            id,
            OpenHandle {
                id,
                target_path,
                staging,
            },
        );
        id
    }

    pub fn get(&self, id: u64) -> Option<&OpenHandle> {
        self.handles.get(&id)
    }

    /// Remove a handle, returning it if it was open
    pub fn remove(&mut self, id: u64) -> Option<OpenHandle> {
        self.handles.remove(&id)
    }

    /// Most recently opened handle targeting `path`
    pub fn pending_for(&self, path: &str) -> Option<&OpenHandle> {
        self.handles
            .values()
            .filter(|handle| handle.target_path == path)
            .max_by_key(|handle| handle.id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
