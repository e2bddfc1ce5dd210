//! Mount lifecycle
//!
//! A [`LiveMount`] owns the fuser background session for one mount point.
//! Starting it prepares the directory, warms the adapter (quota and index)
//! and spawns the session; dropping or unmounting it tears the session down.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fuser::{BackgroundSession, MountOption};
use tokio::runtime::Handle;

use super::drive_fs::DriveFs;
use super::fuse_fs::FuseFs;

/// Filesystem name and subtype shown in the host's mount table
pub const FS_NAME: &str = "drivefs";

/// Mode for mount point directories created on demand
const MOUNT_POINT_MODE: u32 = 0o700;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("mount point {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("mount point {0} is not empty")]
    NotEmpty(PathBuf),
    #[error("mount point I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where to mount
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub mount_point: PathBuf,
}

/// Fixed option set for every mount
pub fn mount_options() -> Vec<MountOption> {
    vec![
        MountOption::FSName(FS_NAME.to_string()),
        MountOption::Subtype(FS_NAME.to_string()),
        MountOption::DefaultPermissions,
    ]
}

/// Make sure `path` is an empty directory, creating it (0700) if absent
pub fn prepare_mount_point(path: &Path) -> Result<(), MountError> {
    if !path.exists() {
        DirBuilder::new()
            .recursive(true)
            .mode(MOUNT_POINT_MODE)
            .create(path)?;
        tracing::info!(path = %path.display(), "created mount point");
        return Ok(());
    }

    if !path.is_dir() {
        return Err(MountError::NotADirectory(path.to_path_buf()));
    }
    if std::fs::read_dir(path)?.next().is_some() {
        return Err(MountError::NotEmpty(path.to_path_buf()));
    }
    Ok(())
}

/// A running mount
pub struct LiveMount {
    mount_point: PathBuf,
    fs: Arc<DriveFs>,
    session: Option<BackgroundSession>,
}

impl std::fmt::Debug for LiveMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMount")
            .field("mount_point", &self.mount_point)
            .field("mounted", &self.session.is_some())
            .finish()
    }
}

impl LiveMount {
    /// Prepare the mount point, warm the adapter and spawn the session.
    ///
    /// Blocks on the remote store, so call it from a blocking context. A
    /// failed initial rebuild is logged and the mount starts with an empty
    /// index.
    pub fn start(config: MountConfig, fs: Arc<DriveFs>, runtime: Handle) -> Result<Self, MountError> {
        let mount_point = config.mount_point;
        prepare_mount_point(&mount_point)?;

        fs.refresh_quota();
        if let Err(e) = fs.rebuild_index() {
            tracing::warn!("initial index rebuild failed, mounting empty: {}", e);
        }

        let session = fuser::spawn_mount2(
            FuseFs::new(Arc::clone(&fs), runtime),
            &mount_point,
            &mount_options(),
        )?;
        tracing::info!(mount_point = %mount_point.display(), "mounted");

        Ok(Self {
            mount_point,
            fs,
            session: Some(session),
        })
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn fs(&self) -> &Arc<DriveFs> {
        &self.fs
    }

    /// Whether the session loop is still serving requests. It stops when the
    /// filesystem is unmounted from outside, e.g. with `fusermount -u`.
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.guard.is_finished())
    }

    /// Tear down the session and unmount
    pub fn unmount(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            // dropping the session unmounts
            drop(session);
            let stats = self.fs.cache_stats();
            tracing::info!(
                mount_point = %self.mount_point.display(),
                cached = stats.entry_count,
                hits = stats.hits,
                misses = stats.misses,
                "unmounted"
            );
        }
    }
}

impl Drop for LiveMount {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_options() {
        let options = mount_options();
        assert!(options.contains(&MountOption::FSName("drivefs".to_string())));
        assert!(options.contains(&MountOption::Subtype("drivefs".to_string())));
        assert!(options.contains(&MountOption::DefaultPermissions));
        assert!(!options.contains(&MountOption::RO));
    }

    #[test]
    fn test_prepare_creates_private_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mount_point = dir.path().join("nested").join("drive");

        prepare_mount_point(&mount_point).unwrap();

        let mode = std::fs::metadata(&mount_point).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_prepare_rejects_non_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"x").unwrap();

        assert!(matches!(
            prepare_mount_point(dir.path()),
            Err(MountError::NotEmpty(_))
        ));
    }

    #[test]
    fn test_prepare_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(
            prepare_mount_point(&file),
            Err(MountError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_prepare_accepts_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(prepare_mount_point(dir.path()).is_ok());
    }
}
