//! # Scanferry upload engine
//!
//! Watches one local directory for files that are still being written (a
//! network scanner dropping PDFs, a camera offloading photos), waits until
//! each file is finished, uploads it to a remote folder and deletes the local
//! copy.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌────────────────────┐    ┌──────────────────┐
//! │ DirectoryEvent  │───▶│     WatchLoop      │───▶│ UploadCoordinator│
//! │ Source (notify) │    │ (sweep + dispatch) │    │  (one task/path) │
//! └─────────────────┘    └────────────────────┘    └──────────────────┘
//!                                                           │
//!                 ┌───────────────────┬─────────────────────┼────────────┐
//!                 ▼                   ▼                     ▼            ▼
//!        ┌────────────────┐  ┌────────────────┐  ┌──────────────┐ ┌───────────┐
//!        │ Stability      │  │ HandleProbe    │  │ RemoteStore  │ │ local     │
//!        │ Detector       │  │ (lsof)         │  │ (upload)     │ │ delete    │
//!        └────────────────┘  └────────────────┘  └──────────────┘ └───────────┘
//! ```
//!
//! Every wait races a shared [`CancellationToken`](tokio_util::sync::CancellationToken),
//! and a path is owned by at most one upload task at a time.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod backends;
pub mod config;
mod coordinator;
pub mod error;
mod events;
mod filter;
pub mod poll;
mod probe;
mod stability;
pub mod traits;
mod uploader;
mod watch_loop;

pub use backends::*;
pub use config::{UploaderConfig, ValidationError};
pub use coordinator::{UploadCoordinator, UploadOutcome, UploadStage};
pub use error::*;
pub use events::*;
pub use filter::{IgnoreFilter, DEFAULT_IGNORE_NAMES};
pub use probe::{wait_until_closed, LsofProbe, LSOF};
pub use stability::{
    SizeTracker, StabilityDetector, DEFAULT_POLL_INTERVAL, DEFAULT_STABILITY_THRESHOLD,
};
pub use traits::{
    DirectoryEventSource, EventStreams, FolderId, HandleProbe, ProgressFn, RemoteFile,
    RemoteStore, UploadProgress, UploadSource,
};
pub use uploader::Uploader;
pub use watch_loop::{Disposition, WatchLoop};

/// Re-export common types for convenience
pub mod prelude {
    pub use crate::{
        DirectoryEventSource, Error, FileEvent, FileEventKind, FolderId, HandleProbe,
        RemoteStore, Result, Uploader, UploaderConfig,
    };
}
