use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::runtime::Handle;

use common::memory::MemoryStore;
use common::RemoteStore;
use drivefs_daemon::{DriveFs, LiveMount, MountConfig, MountError};

use crate::cli::op::{ConnectError, OpContext};

/// How often the session is checked for an external unmount
const SESSION_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Directory to mount the drive on (created if missing)
    pub mount_point: PathBuf,

    /// Mount an empty in-memory store instead of the drive API
    #[arg(long)]
    pub memory: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MountOpError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("mount failed: {0}")]
    Mount(#[from] MountError),
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
    #[error("mount task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Mount {
    type Error = MountOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let store: Arc<dyn RemoteStore> = if self.memory {
            tracing::info!("mounting an in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            ctx.connect_store().await?
        };

        let runtime = Handle::current();
        let fs = Arc::new(DriveFs::new(
            store,
            runtime.clone(),
            ctx.config.drive_fs_config(),
        ));
        let config = MountConfig {
            mount_point: self.mount_point.clone(),
        };

        // Startup blocks on the store, keep it off the async workers
        let live = tokio::task::spawn_blocking(move || LiveMount::start(config, fs, runtime))
            .await??;
        tracing::info!(
            mount_point = %live.mount_point().display(),
            "press Ctrl-C to unmount"
        );

        let shutdown = wait_for_shutdown(tokio::signal::ctrl_c(), SESSION_POLL_INTERVAL, || {
            live.is_active()
        })
        .await?;

        let mount_point = live.mount_point().display().to_string();
        tokio::task::spawn_blocking(move || live.unmount()).await?;
        match shutdown {
            Shutdown::Interrupted => Ok(format!("Unmounted {}", mount_point)),
            Shutdown::SessionEnded => Ok(format!("{} was unmounted externally", mount_point)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    /// Ctrl-C was received
    Interrupted,
    /// The session loop exited on its own
    SessionEnded,
}

/// Wait for `signal` or for `is_active` to turn false, whichever comes first
async fn wait_for_shutdown(
    signal: impl Future<Output = std::io::Result<()>>,
    poll_interval: Duration,
    is_active: impl Fn() -> bool,
) -> std::io::Result<Shutdown> {
    tokio::pin!(signal);
    let mut poll = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            result = &mut signal => {
                result?;
                return Ok(Shutdown::Interrupted);
            }
            _ = poll.tick() => {
                if !is_active() {
                    tracing::warn!("mount session ended without a shutdown signal");
                    return Ok(Shutdown::SessionEnded);
                }
            }
        }
    }
}
