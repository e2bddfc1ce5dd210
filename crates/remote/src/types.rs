//! Wire types for the Drive REST API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{EntryKind, RemoteEntry, FOLDER_MIME_TYPE};

use crate::error::DriveApiError;

/// Fields requested for every file resource
pub(crate) const FILE_FIELDS: &str = "id,name,mimeType,size,parents,modifiedTime";

/// A file resource as returned by `files.list`, `files.get` and uploads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    /// Byte size as a decimal string; absent for folders and native documents
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

impl TryFrom<DriveFile> for RemoteEntry {
    type Error = DriveApiError;

    fn try_from(file: DriveFile) -> Result<Self, Self::Error> {
        let size_bytes = match file.size {
            Some(ref size) => size.parse::<u64>().map_err(|_| DriveApiError::InvalidField {
                field: "size",
                value: size.clone(),
            })?,
            None => 0,
        };
        let kind = if file.mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else {
            EntryKind::File
        };

        Ok(RemoteEntry {
            id: file.id,
            name: file.name,
            kind,
            size_bytes,
            parent_ids: file.parents,
            mime_type: file.mime_type,
            modified_at: file.modified_time,
        })
    }
}

/// One page of `files.list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

/// Response of `about.get?fields=storageQuota`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    #[serde(default)]
    pub storage_quota: StorageQuota,
}

/// Storage figures, all decimal strings. `limit` is absent for unlimited accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageQuota {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
}

impl StorageQuota {
    /// Convert to a quota, mapping an absent limit to zero (unlimited)
    pub fn to_quota(&self) -> Result<common::Quota, DriveApiError> {
        Ok(common::Quota {
            total_bytes: parse_decimal("limit", self.limit.as_deref())?,
            used_bytes: parse_decimal("usage", self.usage.as_deref())?,
        })
    }
}

fn parse_decimal(field: &'static str, value: Option<&str>) -> Result<u64, DriveApiError> {
    match value {
        Some(v) => v.parse().map_err(|_| DriveApiError::InvalidField {
            field,
            value: v.to_string(),
        }),
        None => Ok(0),
    }
}

/// Metadata part of a multipart upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadMetadata<'a> {
    pub name: &'a str,
    pub parents: [&'a str; 1],
}
