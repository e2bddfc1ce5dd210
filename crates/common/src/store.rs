//! Remote store contract
//!
//! The filesystem never talks to the network directly. Everything it needs
//! from the cloud goes through [`RemoteStore`]: paginated listing, upload,
//! download (with export for native documents) and quota.

use async_trait::async_trait;
use bytes::Bytes;

use crate::entry::{RemoteEntry, ROOT_SENTINEL};

/// What a page listing should cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListQuery {
    /// Direct children of one folder
    Children(String),
    /// Every non-deleted object in the store
    AllNonDeleted,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    /// Token for the next page, `None` when the listing is complete
    pub next_page_token: Option<String>,
}

/// Storage quota as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quota {
    /// Zero means unlimited or unknown
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),
    /// The store answered with a failure status
    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// The response body could not be understood
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("remote object not found: {0}")]
    NotFound(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

#[async_trait]
pub trait RemoteStore: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch one page of entries
    ///
    /// # Arguments
    /// * `query` - Which entries to list
    /// * `page_token` - Token returned by the previous page, `None` for the first
    async fn list_page(
        &self,
        query: ListQuery,
        page_token: Option<String>,
    ) -> Result<ListPage, RemoteError>;

    /// Upload `content` as a new file named `name` under `parent_id`
    async fn upload(
        &self,
        name: &str,
        parent_id: &str,
        content: Bytes,
    ) -> Result<RemoteEntry, RemoteError>;

    /// Download the bytes of an entry, exporting native documents
    async fn download(&self, entry: &RemoteEntry) -> Result<Bytes, RemoteError>;

    async fn get_quota(&self) -> Result<Quota, RemoteError>;

    /// Concrete id of the root container. Parents may reference the root
    /// either by this id or by [`ROOT_SENTINEL`].
    fn root_id(&self) -> String {
        ROOT_SENTINEL.to_string()
    }
}
