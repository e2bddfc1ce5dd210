//! Cached storage quota and the statfs figures derived from it

use std::time::{Duration, Instant};

use common::Quota;

/// How long a quota snapshot is served before it is fetched again
pub const DEFAULT_QUOTA_TTL: Duration = Duration::from_secs(5 * 60);

/// Block size reported to the host
pub const BLOCK_SIZE: u32 = 4096;

/// Maximum file name length reported to the host
pub const NAME_MAX: u32 = 255;

/// Total reported when the store does not know (or does not limit) the quota
pub const FALLBACK_TOTAL_BYTES: u64 = 1 << 40;

/// File counts reported to the host. There is no inode accounting.
pub const REPORTED_FILES: u64 = 1 << 20;

/// Last known quota numbers and when they were fetched
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaSnapshot {
    /// Zero means unlimited or unknown
    pub total_bytes: u64,
    pub used_bytes: u64,
    /// `None` until the first successful fetch
    pub fetched_at: Option<Instant>,
}

impl QuotaSnapshot {
    pub fn fetched(quota: Quota, at: Instant) -> Self {
        Self {
            total_bytes: quota.total_bytes,
            used_bytes: quota.used_bytes,
            fetched_at: Some(at),
        }
    }

    /// Whether the snapshot is older than `ttl` (or was never fetched)
    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        match self.fetched_at {
            Some(at) => now.saturating_duration_since(at) > ttl,
            None => true,
        }
    }

    /// Derive filesystem statistics.
    ///
    /// An unknown total becomes 1 TiB, and usage above the total is treated
    /// as zero rather than reporting negative free space.
    pub fn statfs(&self) -> Statfs {
        let total_bytes = if self.total_bytes == 0 {
            FALLBACK_TOTAL_BYTES
        } else {
            self.total_bytes
        };
        let used_bytes = if self.used_bytes > total_bytes {
            0
        } else {
            self.used_bytes
        };
        let free_bytes = total_bytes - used_bytes;
        let block_size = BLOCK_SIZE as u64;

        Statfs {
            total_bytes,
            free_bytes,
            blocks: total_bytes / block_size,
            bfree: free_bytes / block_size,
            bavail: free_bytes / block_size,
            files: REPORTED_FILES,
            ffree: REPORTED_FILES,
            bsize: BLOCK_SIZE,
            namelen: NAME_MAX,
            frsize: BLOCK_SIZE,
        }
    }
}

/// Filesystem statistics in the shape the host expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statfs {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}
