use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use common::{ListPage, ListQuery, Quota, RemoteEntry, RemoteError, RemoteStore, ROOT_SENTINEL};

use crate::error::DriveApiError;
use crate::types::{About, DriveFile, FileList, UploadMetadata, FILE_FIELDS};

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3/";
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3/";

/// Maximum page size accepted by `files.list`
const PAGE_SIZE: u32 = 1000;

/// Distinguishes boundaries generated within one process
static BOUNDARY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Connection settings for [`DriveClient`]
#[derive(Debug, Clone)]
pub struct DriveClientConfig {
    pub access_token: String,
    pub api_base_url: Url,
    pub upload_base_url: Url,
}

impl DriveClientConfig {
    /// Config pointing at the public endpoints
    pub fn new(access_token: impl Into<String>) -> Result<Self, DriveApiError> {
        Ok(Self {
            access_token: access_token.into(),
            api_base_url: Url::parse(DEFAULT_API_BASE_URL)?,
            upload_base_url: Url::parse(DEFAULT_UPLOAD_BASE_URL)?,
        })
    }
}

/// Remote store client for the Drive REST API
#[derive(Clone)]
pub struct DriveClient {
    client: Client,
    config: DriveClientConfig,
    root_id: String,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("api_base_url", &self.config.api_base_url.as_str())
            .field("upload_base_url", &self.config.upload_base_url.as_str())
            .field("root_id", &self.root_id)
            .finish()
    }
}

impl DriveClient {
    /// Build a client and resolve the concrete id of the root folder.
    ///
    /// Fails when the token is rejected, which makes this the first point
    /// where bad credentials surface.
    pub async fn connect(config: DriveClientConfig) -> Result<Self, DriveApiError> {
        let client = Client::builder().build()?;
        let mut drive = Self {
            client,
            config,
            root_id: ROOT_SENTINEL.to_string(),
        };

        let url = drive.api_url(&format!("files/{}", ROOT_SENTINEL))?;
        let root: DriveFile = drive
            .send(drive.authorized(drive.client.get(url).query(&[("fields", "id")])))
            .await?
            .json()
            .await?;
        tracing::info!(root_id = %root.id, "resolved remote root folder");
        drive.root_id = root.id;

        Ok(drive)
    }

    /// The concrete root id resolved at connect time
    pub fn resolved_root_id(&self) -> &str {
        &self.root_id
    }

    fn api_url(&self, path: &str) -> Result<Url, DriveApiError> {
        Ok(self.config.api_base_url.join(path)?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.config.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DriveApiError> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(DriveApiError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    fn list_filter(query: &ListQuery) -> String {
        match query {
            ListQuery::AllNonDeleted => "trashed = false".to_string(),
            ListQuery::Children(folder) => format!(
                "'{}' in parents and trashed = false",
                folder.replace('\\', "\\\\").replace('\'', "\\'")
            ),
        }
    }

    async fn list_page_inner(
        &self,
        query: ListQuery,
        page_token: Option<String>,
    ) -> Result<ListPage, DriveApiError> {
        let url = self.api_url("files")?;
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);
        let mut params = vec![
            ("q", Self::list_filter(&query)),
            ("pageSize", PAGE_SIZE.to_string()),
            ("spaces", "drive".to_string()),
            ("fields", fields),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let list: FileList = self
            .send(self.authorized(self.client.get(url).query(&params)))
            .await?
            .json()
            .await?;

        tracing::debug!(
            files = list.files.len(),
            more = list.next_page_token.is_some(),
            "listed page"
        );

        Ok(ListPage {
            entries: list
                .files
                .into_iter()
                .map(RemoteEntry::try_from)
                .collect::<Result<_, _>>()?,
            next_page_token: list.next_page_token,
        })
    }

    async fn upload_inner(
        &self,
        name: &str,
        parent_id: &str,
        content: Bytes,
    ) -> Result<RemoteEntry, DriveApiError> {
        let mut url = self.config.upload_base_url.join("files")?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart")
            .append_pair("fields", FILE_FIELDS);

        let metadata = serde_json::to_vec(&UploadMetadata {
            name,
            parents: [parent_id],
        })?;
        let media_type = mime_guess::from_path(name).first_or_octet_stream();
        let body = MultipartRelated::new(&metadata, media_type.essence_str(), &content);

        let file: DriveFile = self
            .send(
                self.authorized(self.client.post(url))
                    .header(CONTENT_TYPE, body.content_type())
                    .body(body.body),
            )
            .await?
            .json()
            .await?;

        tracing::info!(name, parent_id, id = %file.id, bytes = content.len(), "uploaded file");
        RemoteEntry::try_from(file)
    }

    async fn download_inner(&self, entry: &RemoteEntry) -> Result<Bytes, DriveApiError> {
        let request = match entry.export_format() {
            Some(format) => {
                let url = self.api_url(&format!("files/{}/export", entry.id))?;
                self.client
                    .get(url)
                    .query(&[("mimeType", format.mime_type())])
            }
            None => {
                let url = self.api_url(&format!("files/{}", entry.id))?;
                self.client.get(url).query(&[("alt", "media")])
            }
        };

        let bytes = self.send(self.authorized(request)).await?.bytes().await?;
        tracing::debug!(id = %entry.id, bytes = bytes.len(), "downloaded file");
        Ok(bytes)
    }

    async fn get_quota_inner(&self) -> Result<Quota, DriveApiError> {
        let url = self.api_url("about")?;
        let about: About = self
            .send(
                self.authorized(self.client.get(url))
                    .query(&[("fields", "storageQuota")]),
            )
            .await?
            .json()
            .await?;
        about.storage_quota.to_quota()
    }
}

/// A `multipart/related` upload body: JSON metadata followed by the media
struct MultipartRelated {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartRelated {
    fn new(metadata: &[u8], media_type: &str, content: &[u8]) -> Self {
        let boundary = boundary_avoiding(&[metadata, content], next_boundary);
        Self::with_boundary(boundary, metadata, media_type, content)
    }

    fn with_boundary(boundary: String, metadata: &[u8], media_type: &str, content: &[u8]) -> Self {
        let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata);
        body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", media_type).as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        Self { boundary, body }
    }

    fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }
}

fn next_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default();
    let sequence = BOUNDARY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("drivefs-{:08x}-{:x}", nanos, sequence)
}

/// First candidate whose delimiter occurs in none of the parts
fn boundary_avoiding(parts: &[&[u8]], mut candidate: impl FnMut() -> String) -> String {
    loop {
        let boundary = candidate();
        let delimiter = format!("--{}", boundary);
        let collides = parts.iter().any(|part| {
            part.windows(delimiter.len())
                .any(|window| window == delimiter.as_bytes())
        });
        if !collides {
            return boundary;
        }
        tracing::debug!(boundary = %boundary, "multipart boundary occurs in content, picking another");
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_page(
        &self,
        query: ListQuery,
        page_token: Option<String>,
    ) -> Result<ListPage, RemoteError> {
        Ok(self.list_page_inner(query, page_token).await?)
    }

    async fn upload(
        &self,
        name: &str,
        parent_id: &str,
        content: Bytes,
    ) -> Result<RemoteEntry, RemoteError> {
        Ok(self.upload_inner(name, parent_id, content).await?)
    }

    async fn download(&self, entry: &RemoteEntry) -> Result<Bytes, RemoteError> {
        Ok(self.download_inner(entry).await?)
    }

    async fn get_quota(&self) -> Result<Quota, RemoteError> {
        Ok(self.get_quota_inner().await?)
    }

    fn root_id(&self) -> String {
        self.root_id.clone()
    }
}
