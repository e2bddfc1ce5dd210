//! Cloud drive filesystem
//!
//! This module exposes a remote object store as a local directory tree.
//!
//! # Architecture
//!
//! - `DriveFs`: path-addressed filesystem operations over a `RemoteStore`
//! - `PathIndex`: canonical path → remote entry, rebuilt from full listings
//! - `ContentCache`: whole-file content, dropped on every index rebuild
//! - `HandleTable`: write sessions backed by local staging files
//! - `QuotaSnapshot`: cached quota and the statfs figures derived from it
//!
//! With the `fuse` feature:
//!
//! - `FuseFs`: fuser operation table delegating to `DriveFs`
//! - `InodeTable`: bidirectional inode ↔ path mapping
//! - `LiveMount`: mount point preparation and the background session
//!
//! # Consistency
//!
//! The remote store is the source of truth. Nothing is patched locally except
//! renames, which last until the next rebuild. Uploads trigger a rebuild so a
//! released file is visible as soon as release returns.

mod cache;
mod drive_fs;
mod error;
mod handle_table;
mod path_index;
mod quota;

#[cfg(feature = "fuse")]
mod fuse_fs;
#[cfg(feature = "fuse")]
mod inode_table;
#[cfg(feature = "fuse")]
mod mount_manager;

pub use cache::{CacheStats, ContentCache};
pub use drive_fs::{Attributes, DriveFs, DriveFsConfig, ReleaseOutcome, DIR_PERM, FILE_PERM};
pub use error::FsError;
pub use handle_table::{HandleTable, OpenHandle};
pub use path_index::{DirEntry, PathIndex};
pub use quota::{QuotaSnapshot, Statfs, DEFAULT_QUOTA_TTL};

#[cfg(feature = "fuse")]
pub use fuse_fs::FuseFs;
#[cfg(feature = "fuse")]
pub use inode_table::InodeTable;
#[cfg(feature = "fuse")]
pub use mount_manager::{mount_options, prepare_mount_point, LiveMount, MountConfig, MountError};
