//! Google Drive implementation of [`RemoteStore`].

use crate::credentials::CredentialProvider;
use crate::error::{DriveError, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use scanferry_watch::{FolderId, ProgressFn, RemoteFile, RemoteStore, UploadProgress, UploadSource};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

/// Public Drive API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Resumable upload chunks must be a multiple of this size.
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// Default resumable upload chunk size (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * CHUNK_ALIGNMENT;

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Serialize)]
struct NewFile<'a> {
    name: &'a str,
    parents: [&'a str; 1],
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Drive v3 client uploading into a single folder.
#[derive(Clone)]
pub struct DriveStore {
    http: Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    chunk_size: usize,
}

impl DriveStore {
    /// Create a store authenticating with `credentials`.
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let http = Client::builder()
            // 308 is the resumable upload "keep going" answer, not a redirect.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Point the store at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the upload chunk size, rounded up to a multiple of [`CHUNK_ALIGNMENT`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.div_ceil(CHUNK_ALIGNMENT).max(1) * CHUNK_ALIGNMENT;
        self
    }

    /// Upload chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Look up the id of the folder called exactly `name`.
    pub async fn find_folder(&self, name: &str) -> Result<FolderId> {
        let query = format!(
            "name = '{}' and mimeType = '{}'",
            escape_query_value(name),
            FOLDER_MIME_TYPE
        );
        debug!(%query, "Looking up Drive folder");

        let url = format!("{}/drive/v3/files", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.credentials.access_token().await?)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await?;
        let list: FileList = self.handle_response(response).await?;

        list.files
            .into_iter()
            .find(|f| f.name == name)
            .map(|f| FolderId::new(f.id))
            .ok_or_else(|| DriveError::FolderNotFound(name.to_string()))
    }

    /// Resumable upload of `source` into `folder`.
    pub async fn upload_resumable(
        &self,
        mut source: UploadSource,
        folder: &FolderId,
        progress: ProgressFn,
    ) -> Result<RemoteFile> {
        let session = self.start_session(&source, folder).await?;
        let total = source.size;
        let mut offset: u64 = 0;
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let want = (total - offset).min(self.chunk_size as u64) as usize;
            let chunk = &mut buf[..want];
            source.file.read_exact(chunk).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    DriveError::InvalidResponse(format!(
                        "{} shrank below {} bytes during upload",
                        source.name, total
                    ))
                } else {
                    DriveError::Io(e)
                }
            })?;

            let content_range = if total == 0 {
                "bytes */0".to_string()
            } else {
                format!("bytes {}-{}/{}", offset, offset + want as u64 - 1, total)
            };
            let response = self
                .http
                .put(&session)
                .bearer_auth(self.credentials.access_token().await?)
                .header(CONTENT_RANGE, content_range)
                .body(chunk.to_vec())
                .send()
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    progress(UploadProgress { sent: total, total });
                    let file: DriveFile = response.json().await.map_err(|e| {
                        DriveError::InvalidResponse(format!("Invalid upload response: {}", e))
                    })?;
                    return Ok(RemoteFile {
                        id: file.id,
                        name: file.name,
                    });
                }
                StatusCode::PERMANENT_REDIRECT => {
                    let sent = offset + want as u64;
                    // No Range header means nothing has been persisted yet.
                    let acked = acknowledged_bytes(&response).unwrap_or(0);
                    if acked > total {
                        return Err(DriveError::InvalidResponse(format!(
                            "server acknowledged {} of {} bytes",
                            acked, total
                        )));
                    }
                    if acked != sent {
                        warn!(sent, acked, "Server kept a partial chunk, resending the rest");
                        source.file.seek(SeekFrom::Start(acked)).await?;
                    }
                    if acked == total {
                        return Err(DriveError::InvalidResponse(
                            "upload session still open after the last byte".to_string(),
                        ));
                    }
                    offset = acked;
                    progress(UploadProgress {
                        sent: offset,
                        total,
                    });
                }
                _ => return Err(Self::status_error(response).await),
            }
        }
    }

    async fn start_session(&self, source: &UploadSource, folder: &FolderId) -> Result<String> {
        let url = format!("{}/upload/drive/v3/files", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.credentials.access_token().await?)
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Length", source.size.to_string())
            .json(&NewFile {
                name: &source.name,
                parents: [folder.as_str()],
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                DriveError::InvalidResponse("resumable session without a Location header".into())
            })
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(&self, response: Response) -> Result<T> {
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| {
                warn!("Failed to parse response JSON: {}", e);
                DriveError::InvalidResponse(format!("Invalid JSON response: {}", e))
            })
        } else {
            Err(Self::status_error(response).await)
        }
    }

    async fn status_error(response: Response) -> DriveError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => format!("HTTP {}", status),
        };
        DriveError::Status { status, message }
    }
}

/// Escape a value for a single-quoted Drive query string.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Bytes persisted by the server, from a `Range: bytes=0-N` header.
fn acknowledged_bytes(response: &Response) -> Option<u64> {
    let range = response.headers().get(RANGE)?.to_str().ok()?;
    let end = range.strip_prefix("bytes=")?.split('-').nth(1)?;
    end.trim().parse::<u64>().ok().map(|n| n + 1)
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn name(&self) -> &'static str {
        "google-drive"
    }

    async fn resolve_folder(&self, name: &str) -> scanferry_watch::Result<FolderId> {
        Ok(self.find_folder(name).await?)
    }

    async fn upload(
        &self,
        source: UploadSource,
        folder: &FolderId,
        progress: ProgressFn,
    ) -> scanferry_watch::Result<RemoteFile> {
        Ok(self.upload_resumable(source, folder, progress).await?)
    }
}

impl std::fmt::Debug for DriveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveStore")
            .field("base_url", &self.base_url)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
