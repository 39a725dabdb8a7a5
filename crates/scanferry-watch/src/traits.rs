//! Core traits for the collaborators the upload engine talks to.

use crate::{error::Result, events::FileEvent, Error};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiving ends of a directory event source.
///
/// `events` carries change notifications for the watched directory, `errors`
/// carries errors raised by the source itself. Both close when the source is
/// closed.
#[derive(Debug)]
pub struct EventStreams {
    /// File change events.
    pub events: mpsc::UnboundedReceiver<FileEvent>,
    /// Source-level errors.
    pub errors: mpsc::UnboundedReceiver<Error>,
}

/// A stream of change events for one directory.
pub trait DirectoryEventSource: Send {
    /// Get the backend type identifier.
    fn backend_type(&self) -> &'static str;

    /// Directory this source reports on.
    fn directory(&self) -> &Path;

    /// Hand out the event and error streams. Only the first call succeeds.
    fn take_streams(&mut self) -> Result<EventStreams>;

    /// Tear the source down. Safe to call more than once.
    fn close(&mut self);
}

/// Opaque identifier of the destination folder in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderId(String);

impl FolderId {
    /// Wrap a store-specific folder identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open local file ready to be streamed to the remote store.
#[derive(Debug)]
pub struct UploadSource {
    /// Name the file should get remotely (the local base name).
    pub name: String,
    /// Readable handle positioned at the start of the file.
    pub file: tokio::fs::File,
    /// Size of the file in bytes when it was opened.
    pub size: u64,
}

/// The file created by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Store-specific identifier of the new file.
    pub id: String,
    /// Name of the new file.
    pub name: String,
}

/// Progress of an upload in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes sent so far.
    pub sent: u64,
    /// Total bytes to send.
    pub total: u64,
}

/// Callback invoked as an upload makes progress.
pub type ProgressFn = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Remote storage the engine uploads into.
///
/// Implementations report failures as [`Error::Remote`]; the engine treats
/// every upload error as terminal for that attempt.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short name of the store, for logs.
    fn name(&self) -> &'static str;

    /// Resolve a human-readable folder name to its identifier.
    async fn resolve_folder(&self, name: &str) -> Result<FolderId>;

    /// Stream `source` into `folder`.
    async fn upload(
        &self,
        source: UploadSource,
        folder: &FolderId,
        progress: ProgressFn,
    ) -> Result<RemoteFile>;
}

/// Checks whether any process currently holds a file open.
#[async_trait]
pub trait HandleProbe: Send + Sync {
    /// Probe name, for logs.
    fn name(&self) -> &'static str;

    /// Returns `true` if some process has `path` open.
    async fn is_open(&self, path: &Path, cancel: &CancellationToken) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_id_display() {
        let id = FolderId::new("1AbCdEf");
        assert_eq!(id.as_str(), "1AbCdEf");
        assert_eq!(id.to_string(), "1AbCdEf");
    }
}
