// Configuration and process setup
pub mod config;
pub mod logging;

// Filesystem (the FUSE operation table and mount lifecycle need `fuse`)
pub mod fuse;

pub use config::{Config, ConfigError};
pub use fuse::{DriveFs, DriveFsConfig, FsError, ReleaseOutcome};
#[cfg(feature = "fuse")]
pub use fuse::{LiveMount, MountConfig, MountError};
