//! Core data model for drivefs
//!
//! This crate holds the pieces shared between the remote store client and the
//! filesystem daemon:
//!
//! - [`RemoteEntry`]: a snapshot of one remote object (file or folder)
//! - [`RemoteStore`]: the collaborator contract the filesystem consumes
//! - [`path`]: canonical path helpers (`""` is the root, no leading slash)
//! - [`memory::MemoryStore`]: an in-process store used by tests and demo mounts

pub mod entry;
pub mod memory;
pub mod path;
pub mod store;

pub use entry::{EntryKind, ExportFormat, RemoteEntry, FOLDER_MIME_TYPE, ROOT_SENTINEL};
pub use store::{ListPage, ListQuery, Quota, RemoteError, RemoteStore};
