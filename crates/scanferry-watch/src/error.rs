//! Error types for the upload engine.

use thiserror::Error;

/// Errors that can occur while watching, stabilizing or uploading files.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system watching error.
    #[error("File watching error: {0}")]
    Watch(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The open-handle probe ran but reported a failure.
    #[error("Open-handle probe failed: {0}")]
    Probe(String),

    /// The open-handle probe tool is not installed on this host.
    #[error("Open-handle probe '{0}' is not available on this host")]
    ProbeUnavailable(String),

    /// Remote store error (folder resolution or upload).
    #[error("Remote store error: {0}")]
    Remote(String),

    /// The event source streams were already handed out.
    #[error("Event source '{0}' has already been consumed")]
    SourceConsumed(&'static str),

    /// Invalid path.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The run was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether this error means the file disappeared from disk.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result type for upload engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Convert notify errors to our error type.
impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Probe("boom".to_string()).is_cancelled());
    }

    #[test]
    fn test_not_found_detection() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(err.is_not_found());

        let err: Error = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_probe_unavailable_message_names_tool() {
        let err = Error::ProbeUnavailable("lsof".to_string());
        assert!(err.to_string().contains("lsof"));
    }
}
