use std::fmt::{Debug, Display};
use std::sync::Arc;

use common::RemoteStore;
use drivefs_daemon::{Config, ConfigError};
use remote::{DriveApiError, DriveClient};

/// Shared state handed to every command
#[derive(Debug, Clone)]
pub struct OpContext {
    pub config: Config,
}

impl OpContext {
    /// Connect to the drive API with the configured token
    pub async fn connect_store(&self) -> Result<Arc<dyn RemoteStore>, ConnectError> {
        let client = DriveClient::connect(self.config.client_config()?).await?;
        tracing::debug!(root_id = %client.resolved_root_id(), "connected to drive");
        Ok(Arc::new(client))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to connect to drive: {0}")]
    Api(#[from] DriveApiError),
}

/// A CLI command
#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: Display + Debug + Send;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Generate a `Command` subcommand enum over a list of ops, together with
/// `OpOutput`/`OpError` enums and an `Op` impl that dispatches to each variant
#[macro_export]
macro_rules! command_enum {
    ($($(#[$attr:meta])* ($variant:ident, $ty:ty)),* $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $($(#[$attr])* $variant($ty),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($(#[$attr])* $variant(<$ty as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $($(#[$attr])* #[error(transparent)] $variant(<$ty as $crate::cli::op::Op>::Error),)*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($(#[$attr])* OpOutput::$variant(output) => write!(f, "{}", output),)*
                }
            }
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Error = OpError;
            type Output = OpOutput;

            async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $($(#[$attr])* Command::$variant(op) => op
                        .execute(ctx)
                        .await
                        .map(OpOutput::$variant)
                        .map_err(OpError::$variant),)*
                }
            }
        }
    };
}
