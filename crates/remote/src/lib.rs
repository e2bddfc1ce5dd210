//! HTTP remote store for drivefs
//!
//! [`DriveClient`] speaks a Drive-v3-shaped REST API and implements
//! [`common::RemoteStore`] on top of it. It expects an already issued bearer
//! token; acquiring and refreshing credentials happens elsewhere.
//!
//! # Example
//!
//! ```rust,no_run
//! use remote::{DriveClient, DriveClientConfig};
//!
//! # async fn example() -> Result<(), remote::DriveApiError> {
//! let config = DriveClientConfig::new("ya29.token")?;
//! let client = DriveClient::connect(config).await?;
//! println!("root folder id: {}", client.resolved_root_id());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod types;

pub use client::{DriveClient, DriveClientConfig, DEFAULT_API_BASE_URL, DEFAULT_UPLOAD_BASE_URL};
pub use error::DriveApiError;
pub use types::{About, DriveFile, FileList, StorageQuota};
