//! Remote object snapshots
//!
//! A [`RemoteEntry`] is an immutable copy of the remote metadata for one
//! object at fetch time. Objects point at their parents by id; the store has
//! no notion of paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parent id used by the remote store to address its root container.
pub const ROOT_SENTINEL: &str = "root";

/// MIME type the remote store assigns to folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Whether an entry is a folder or a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
}

/// One remote object as listed by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub size_bytes: u64,
    /// Parent ids in remote order. The first one decides the entry's path.
    pub parent_ids: Vec<String>,
    pub mime_type: String,
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    /// Build a folder entry
    pub fn folder(id: impl Into<String>, name: impl Into<String>, parents: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntryKind::Folder,
            size_bytes: 0,
            parent_ids: parents.iter().map(|p| p.to_string()).collect(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            modified_at: None,
        }
    }

    /// Build a regular file entry
    pub fn file(
        id: impl Into<String>,
        name: impl Into<String>,
        size_bytes: u64,
        parents: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntryKind::File,
            size_bytes,
            parent_ids: parents.iter().map(|p| p.to_string()).collect(),
            mime_type: "application/octet-stream".to_string(),
            modified_at: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// The parent that decides this entry's path, or the root sentinel when
    /// the entry has no parents.
    pub fn primary_parent(&self) -> &str {
        self.parent_ids
            .first()
            .map(String::as_str)
            .unwrap_or(ROOT_SENTINEL)
    }

    /// Export target for native documents, `None` for opaque files.
    pub fn export_format(&self) -> Option<ExportFormat> {
        ExportFormat::for_mime_type(&self.mime_type)
    }
}

/// Interoperable binary format a native document is exported to on download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Spreadsheets export as xlsx workbooks
    Workbook,
    /// Documents export as docx
    WordProcessor,
    /// Presentations export as pptx
    SlideDeck,
}

impl ExportFormat {
    pub fn for_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type {
            "application/vnd.google-apps.spreadsheet" => Some(Self::Workbook),
            "application/vnd.google-apps.document" => Some(Self::WordProcessor),
            "application/vnd.google-apps.presentation" => Some(Self::SlideDeck),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Workbook => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::WordProcessor => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::SlideDeck => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Workbook => "xlsx",
            Self::WordProcessor => "docx",
            Self::SlideDeck => "pptx",
        }
    }
}
