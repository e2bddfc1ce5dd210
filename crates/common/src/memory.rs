//! In-process remote store
//!
//! `MemoryStore` keeps the whole object graph in memory and counts every
//! call made against it. The daemon tests use it to observe how often the
//! filesystem reaches for the network, and `drivefs mount --memory` uses it
//! to mount a scratch volume without credentials.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::entry::{EntryKind, RemoteEntry, ROOT_SENTINEL};
use crate::store::{ListPage, ListQuery, Quota, RemoteError, RemoteStore};

/// Default number of entries returned per listing page
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<RemoteEntry>,
    contents: HashMap<String, Bytes>,
    quota: Quota,
    next_id: u64,
    /// Fail every listing page at or after this index
    fail_pages_from: Option<usize>,
}

/// Remote store backed by process memory
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    page_size: usize,
    fail_uploads: AtomicBool,
    fail_downloads: AtomicBool,
    fail_quota: AtomicBool,
    /// `false` while downloads are held
    download_gate: watch::Sender<bool>,
    held_downloads: AtomicU64,
    list_calls: AtomicU64,
    upload_calls: AtomicU64,
    download_calls: AtomicU64,
    quota_calls: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a store that splits listings into pages of `page_size` entries
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
            page_size: page_size.max(1),
            fail_uploads: AtomicBool::new(false),
            fail_downloads: AtomicBool::new(false),
            fail_quota: AtomicBool::new(false),
            download_gate: watch::Sender::new(true),
            held_downloads: AtomicU64::new(0),
            list_calls: AtomicU64::new(0),
            upload_calls: AtomicU64::new(0),
            download_calls: AtomicU64::new(0),
            quota_calls: AtomicU64::new(0),
        }
    }

    /// Seed the store with an entry and its content
    pub fn insert(&self, entry: RemoteEntry, content: impl Into<Bytes>) {
        let mut inner = self.inner.lock();
        inner.contents.insert(entry.id.clone(), content.into());
        inner.entries.push(entry);
    }

    /// Seed the store with an entry that has no content (folders)
    pub fn insert_entry(&self, entry: RemoteEntry) {
        self.inner.lock().entries.push(entry);
    }

    pub fn set_quota(&self, quota: Quota) {
        self.inner.lock().quota = quota;
    }

    /* Failure injection */

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_quota(&self, fail: bool) {
        self.fail_quota.store(fail, Ordering::SeqCst);
    }

    /// Fail listing pages with index `page` and later. `None` heals the store.
    pub fn fail_pages_from(&self, page: Option<usize>) {
        self.inner.lock().fail_pages_from = page;
    }

    /// Make every download wait until [`MemoryStore::release_downloads`]
    pub fn hold_downloads(&self) {
        self.download_gate.send_replace(false);
    }

    pub fn release_downloads(&self) {
        self.download_gate.send_replace(true);
    }

    /// Downloads currently waiting on the gate
    pub fn held_downloads(&self) -> u64 {
        self.held_downloads.load(Ordering::SeqCst)
    }

    /* Call counters */

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u64 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> u64 {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn quota_calls(&self) -> u64 {
        self.quota_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored entry, in insertion order
    pub fn entries(&self) -> Vec<RemoteEntry> {
        self.inner.lock().entries.clone()
    }

    fn matches(entry: &RemoteEntry, query: &ListQuery) -> bool {
        match query {
            ListQuery::AllNonDeleted => true,
            ListQuery::Children(folder) if folder == ROOT_SENTINEL => {
                entry.parent_ids.is_empty() || entry.parent_ids.iter().any(|p| p == ROOT_SENTINEL)
            }
            ListQuery::Children(folder) => entry.parent_ids.iter().any(|p| p == folder),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_page(
        &self,
        query: ListQuery,
        page_token: Option<String>,
    ) -> Result<ListPage, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RemoteError::Decode(format!("invalid page token: {}", token)))?,
            None => 0,
        };

        let inner = self.inner.lock();
        let page_index = offset / self.page_size;
        if let Some(fail_from) = inner.fail_pages_from {
            if page_index >= fail_from {
                return Err(RemoteError::Transport(format!(
                    "injected listing failure on page {}",
                    page_index
                )));
            }
        }

        let matching: Vec<&RemoteEntry> = inner
            .entries
            .iter()
            .filter(|entry| Self::matches(entry, &query))
            .collect();
        let end = (offset + self.page_size).min(matching.len());
        let entries = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|entry| (*entry).clone())
            .collect();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(ListPage {
            entries,
            next_page_token,
        })
    }

    async fn upload(
        &self,
        name: &str,
        parent_id: &str,
        content: Bytes,
    ) -> Result<RemoteEntry, RemoteError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 503,
                message: "injected upload failure".to_string(),
            });
        }

        let mut inner = self.inner.lock();
        let id = format!("mem-{}", inner.next_id);
        inner.next_id += 1;

        let entry = RemoteEntry {
            id: id.clone(),
            name: name.to_string(),
            kind: EntryKind::File,
            size_bytes: content.len() as u64,
            parent_ids: vec![parent_id.to_string()],
            mime_type: "application/octet-stream".to_string(),
            modified_at: Some(Utc::now()),
        };
        inner.quota.used_bytes += content.len() as u64;
        inner.contents.insert(id, content);
        inner.entries.push(entry.clone());

        tracing::debug!(name, parent_id, id = %entry.id, "memory store upload");
        Ok(entry)
    }

    async fn download(&self, entry: &RemoteEntry) -> Result<Bytes, RemoteError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.download_gate.subscribe();
        if !*gate.borrow_and_update() {
            self.held_downloads.fetch_add(1, Ordering::SeqCst);
            // the sender lives as long as the store
            let _ = gate.wait_for(|open| *open).await;
            self.held_downloads.fetch_sub(1, Ordering::SeqCst);
        }

        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport(
                "injected download failure".to_string(),
            ));
        }

        self.inner
            .lock()
            .contents
            .get(&entry.id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(entry.id.clone()))
    }

    async fn get_quota(&self) -> Result<Quota, RemoteError> {
        self.quota_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_quota.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("injected quota failure".to_string()));
        }
        Ok(self.inner.lock().quota)
    }
}
