use std::path::PathBuf;

use clap::Parser;

use drivefs_daemon::{logging, Config};

mod cli;

use cli::op::{Op, OpContext};
use cli::Command;

#[derive(Parser, Debug)]
#[command(name = "drivefs", version, about = "Mount a cloud drive as a local filesystem")]
struct Args {
    /// Path to the config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

/// Flags that override config file values
#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// Bearer token for the drive API
    #[arg(long, env = "DRIVEFS_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    #[arg(long, global = true)]
    api_base_url: Option<String>,

    #[arg(long, global = true)]
    upload_base_url: Option<String>,

    /// Bound the content cache to this many bytes
    #[arg(long, global = true)]
    cache_max_bytes: Option<u64>,

    /// Directory for write staging files
    #[arg(long, global = true)]
    staging_dir: Option<PathBuf>,

    /// Also write daily log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

impl From<ConfigArgs> for Config {
    fn from(args: ConfigArgs) -> Self {
        Config {
            access_token: args.access_token,
            api_base_url: args.api_base_url,
            upload_base_url: args.upload_base_url,
            cache_max_bytes: args.cache_max_bytes,
            staging_dir: args.staging_dir,
            log_dir: args.log_dir,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?.merge(args.overrides.into());
    let _log_guard = logging::init(args.verbose, config.log_dir.as_deref());

    let ctx = OpContext { config };
    let output = args.command.execute(&ctx).await?;
    println!("{}", output);
    Ok(())
}
