use std::fmt;

use clap::Args;
use comfy_table::Table;
use serde::Serialize;

use common::{path, EntryKind, RemoteError};
use drivefs_daemon::fuse::PathIndex;

use crate::cli::op::{ConnectError, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Directory to list (defaults to the root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LsItem {
    pub kind: &'static str,
    pub name: String,
    pub size: u64,
    pub id: String,
}

#[derive(Debug)]
pub struct LsOutput {
    pub items: Vec<LsItem>,
    pub json: bool,
}

impl fmt::Display for LsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.json {
            let json = serde_json::to_string_pretty(&self.items).map_err(|_| fmt::Error)?;
            return write!(f, "{json}");
        }

        if self.items.is_empty() {
            return write!(f, "No items found");
        }

        let mut table = Table::new();
        table.set_header(vec!["TYPE", "NAME", "SIZE", "ID"]);
        for item in &self.items {
            table.add_row(vec![
                item.kind.to_string(),
                item.name.clone(),
                item.size.to_string(),
                item.id.clone(),
            ]);
        }
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("failed to list remote store: {0}")]
    Remote(#[from] RemoteError),
    #[error("no such directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = LsOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let store = ctx.connect_store().await?;
        let index = PathIndex::rebuild(store.as_ref()).await?;
        let dir = path::canonicalize(&self.path);

        if !dir.is_empty() {
            match index.get(&dir) {
                Some(entry) if entry.is_folder() => {}
                Some(_) => return Err(LsError::NotADirectory(dir)),
                None => return Err(LsError::NotFound(dir)),
            }
        }

        let items = index
            .children(&dir)
            .into_iter()
            .filter_map(|child| index.get(&path::join(&dir, &child.name)))
            .map(|entry| LsItem {
                kind: match entry.kind {
                    EntryKind::Folder => "dir",
                    EntryKind::File => "file",
                },
                name: entry.name.clone(),
                size: entry.size_bytes,
                id: entry.id.clone(),
            })
            .collect();

        Ok(LsOutput {
            items,
            json: self.json,
        })
    }
}
