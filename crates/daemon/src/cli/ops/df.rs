use std::fmt;
use std::time::Instant;

use clap::Args;
use owo_colors::OwoColorize;

use common::RemoteError;
use drivefs_daemon::fuse::{QuotaSnapshot, Statfs};

use crate::cli::op::{ConnectError, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Df;

#[derive(Debug)]
pub struct DfOutput {
    /// Raw figures from the store (zero total means unlimited)
    pub snapshot: QuotaSnapshot,
    pub stats: Statfs,
}

impl fmt::Display for DfOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.stats.total_bytes - self.stats.free_bytes;
        let total_note = if self.snapshot.total_bytes == 0 {
            format!(" {}", "(unlimited, reported as 1 TiB)".dimmed())
        } else {
            String::new()
        };

        writeln!(f, "{}:", "Quota".bold())?;
        writeln!(
            f,
            "  {} {}{}",
            "total:".dimmed(),
            human_bytes(self.stats.total_bytes),
            total_note
        )?;
        writeln!(f, "  {} {}", "used:".dimmed(), human_bytes(used))?;
        writeln!(
            f,
            "  {} {}",
            "free:".dimmed(),
            human_bytes(self.stats.free_bytes).green()
        )?;
        write!(
            f,
            "  {} {} x {} bytes",
            "blocks:".dimmed(),
            self.stats.blocks,
            self.stats.bsize
        )
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DfError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("failed to fetch quota: {0}")]
    Remote(#[from] RemoteError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Df {
    type Error = DfError;
    type Output = DfOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let store = ctx.connect_store().await?;
        let quota = store.get_quota().await?;
        let snapshot = QuotaSnapshot::fetched(quota, Instant::now());

        Ok(DfOutput {
            snapshot,
            stats: snapshot.statfs(),
        })
    }
}
