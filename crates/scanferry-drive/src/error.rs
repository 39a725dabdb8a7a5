//! Error types for the Google Drive client

use thiserror::Error;

/// Errors raised while talking to Google Drive or its OAuth endpoints
#[derive(Debug, Error)]
pub enum DriveError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an unexpected status
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// Token could not be obtained or refreshed
    #[error("Token error: {0}")]
    Token(String),

    /// Client secrets file is missing or malformed
    #[error("Invalid credentials file {path}: {message}")]
    Credentials {
        /// Path of the secrets file
        path: String,
        /// What was wrong with it
        message: String,
    },

    /// Destination folder does not exist
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O failed (token file, upload source)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Drive operations
pub type Result<T> = std::result::Result<T, DriveError>;

impl From<DriveError> for scanferry_watch::Error {
    fn from(err: DriveError) -> Self {
        scanferry_watch::Error::Remote(err.to_string())
    }
}
