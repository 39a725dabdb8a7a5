//! File event types delivered by directory event sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Represents a single file system change in the watched directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEvent {
    /// Kind of file event.
    pub kind: FileEventKind,

    /// Path to the affected file.
    pub path: PathBuf,

    /// Timestamp when the event was observed.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Create a new file event stamped with the current time.
    pub fn new(kind: FileEventKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a write event.
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::Modified, path.into())
    }

    /// Get the file name as a string.
    pub fn file_name(&self) -> Option<String> {
        self.path.file_name()?.to_str().map(|s| s.to_string())
    }

    /// Whether this event reports new content written to the file.
    pub fn is_write(&self) -> bool {
        self.kind.is_write()
    }
}

/// Kinds of file events that can occur.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileEventKind {
    /// File was created.
    Created,
    /// File content was written.
    Modified,
    /// Only file metadata (permissions, timestamps) changed.
    Metadata,
    /// File was renamed.
    Renamed,
    /// File was deleted.
    Deleted,
    /// Anything the source could not classify.
    Other(String),
}

impl FileEventKind {
    /// Check if this event is a content write.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Modified)
    }

    /// Get a string representation of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Metadata => "metadata",
            Self::Renamed => "renamed",
            Self::Deleted => "deleted",
            Self::Other(_) => "other",
        }
    }
}

impl std::fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
