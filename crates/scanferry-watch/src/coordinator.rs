//! Per-path upload coordination.
//!
//! Every path moves through
//! `Claimed -> Stabilizing -> ClosedCheck -> Uploading -> Deleting -> Done`,
//! or stops at the first failure. At most one task owns a path at a time;
//! ownership is a [`Claim`] guard that releases the path when dropped, so a
//! failed, panicking or cancelled task never leaves a path stuck.

use crate::error::{Error, Result};
use crate::probe::wait_until_closed;
use crate::stability::StabilityDetector;
use crate::traits::{
    FolderId, HandleProbe, ProgressFn, RemoteFile, RemoteStore, UploadProgress, UploadSource,
};
use indicatif::HumanBytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Paths currently owned by an upload task.
#[derive(Debug, Default)]
pub(crate) struct InFlightSet {
    paths: Mutex<HashSet<PathBuf>>,
}

impl InFlightSet {
    /// Atomically claim `path`. Returns `None` if another task owns it.
    pub(crate) fn try_claim(self: &Arc<Self>, path: &Path) -> Option<Claim> {
        let mut paths = self.paths.lock();
        if !paths.insert(path.to_path_buf()) {
            return None;
        }
        Some(Claim {
            set: Arc::clone(self),
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn is_claimed(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub(crate) fn len(&self) -> usize {
        self.paths.lock().len()
    }

    fn release(&self, path: &Path) {
        self.paths.lock().remove(path);
    }
}

/// Ownership of one path; releases it on drop.
#[derive(Debug)]
pub(crate) struct Claim {
    set: Arc<InFlightSet>,
    path: PathBuf,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.set.release(&self.path);
    }
}

/// Stage a task reached before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    /// Waiting for the size to settle.
    Stabilizing,
    /// Waiting for writers to close the file.
    ClosedCheck,
    /// Sending the file to the remote store.
    Uploading,
    /// Removing the local copy.
    Deleting,
}

impl UploadStage {
    /// Get a string representation of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stabilizing => "stabilizing",
            Self::ClosedCheck => "closed-check",
            Self::Uploading => "uploading",
            Self::Deleting => "deleting",
        }
    }
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an upload task ended.
#[derive(Debug)]
pub enum UploadOutcome {
    /// Another task already owned the path.
    Duplicate,
    /// The file was uploaded. `removed_local` is false if deleting the local
    /// copy failed afterwards.
    Uploaded {
        /// The file created remotely.
        remote: RemoteFile,
        /// Whether the local copy was removed.
        removed_local: bool,
    },
    /// The task gave up; the file is left in place.
    Failed {
        /// Stage that failed.
        stage: UploadStage,
        /// Why it failed.
        error: Error,
    },
    /// The run was cancelled while the task was in `stage`.
    Cancelled {
        /// Stage the task was in.
        stage: UploadStage,
    },
}

/// Drives claimed paths from "just written" to "uploaded and removed".
pub struct UploadCoordinator {
    store: Arc<dyn RemoteStore>,
    folder: FolderId,
    probe: Arc<dyn HandleProbe>,
    stability: StabilityDetector,
    in_flight: Arc<InFlightSet>,
}

impl UploadCoordinator {
    /// Create a coordinator uploading into `folder`.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        folder: FolderId,
        probe: Arc<dyn HandleProbe>,
        stability: StabilityDetector,
    ) -> Self {
        Self {
            store,
            folder,
            probe,
            stability,
            in_flight: Arc::new(InFlightSet::default()),
        }
    }

    /// Whether some task currently owns `path`.
    pub fn is_claimed(&self, path: &Path) -> bool {
        self.in_flight.is_claimed(path)
    }

    /// Number of paths currently owned by tasks.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Process `path` on a detached task.
    ///
    /// Callers may drop the handle; the task only synchronises with the rest
    /// of the system through the in-flight set and `cancel`.
    pub fn spawn(self: &Arc<Self>, path: PathBuf, cancel: CancellationToken) -> JoinHandle<UploadOutcome> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.process(&path, &cancel).await })
    }

    /// Claim `path` and take it through the whole pipeline.
    ///
    /// Never returns an error: failures are logged and reported in the
    /// outcome, and the claim is released before returning.
    pub async fn process(&self, path: &Path, cancel: &CancellationToken) -> UploadOutcome {
        let Some(_claim) = self.in_flight.try_claim(path) else {
            debug!(path = %path.display(), "Already in flight, dropping duplicate");
            return UploadOutcome::Duplicate;
        };

        match self.run_pipeline(path, cancel).await {
            Ok(outcome) => outcome,
            Err((stage, Error::Cancelled)) => {
                info!(path = %path.display(), %stage, "Upload cancelled");
                UploadOutcome::Cancelled { stage }
            }
            Err((stage, error)) => {
                match stage {
                    UploadStage::Uploading => {
                        error!(path = %path.display(), "Failed to upload file: {}", error)
                    }
                    _ => error!(path = %path.display(), %stage, "Failed waiting for file: {}", error),
                }
                UploadOutcome::Failed { stage, error }
            }
        }
    }

    async fn run_pipeline(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<UploadOutcome, (UploadStage, Error)> {
        self.stability
            .wait_until_stable(path, cancel)
            .await
            .map_err(|e| (UploadStage::Stabilizing, e))?;

        wait_until_closed(self.probe.as_ref(), path, self.stability.interval(), cancel)
            .await
            .map_err(|e| (UploadStage::ClosedCheck, e))?;

        let remote = self
            .upload(path, cancel)
            .await
            .map_err(|e| (UploadStage::Uploading, e))?;
        info!(path = %path.display(), remote_id = %remote.id, "Uploaded file");

        info!(path = %path.display(), "Removing local copy");
        let removed_local = match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) => {
                // The remote copy is authoritative now; a leftover local file
                // is only a cleanup problem.
                warn!(path = %path.display(), stage = %UploadStage::Deleting, "Failed to delete file: {}", e);
                false
            }
        };

        Ok(UploadOutcome::Uploaded {
            remote,
            removed_local,
        })
    }

    async fn upload(&self, path: &Path, cancel: &CancellationToken) -> Result<RemoteFile> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;

        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        info!(path = %path.display(), size = %HumanBytes(size), store = self.store.name(), "Uploading file");

        let shown = path.display().to_string();
        let progress: ProgressFn = Arc::new(move |p: UploadProgress| {
            info!(
                path = %shown,
                sent = %HumanBytes(p.sent),
                total = %HumanBytes(p.total),
                "Upload progress"
            );
        });

        let source = UploadSource { name, file, size };
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.store.upload(source, &self.folder, progress) => result,
        }
    }
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("store", &self.store.name())
            .field("folder", &self.folder)
            .field("probe", &self.probe.name())
            .field("stability", &self.stability)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let set = Arc::new(InFlightSet::default());
        let path = Path::new("/in/scan.pdf");

        let claim = set.try_claim(path).expect("first claim succeeds");
        assert!(set.is_claimed(path));
        assert!(set.try_claim(path).is_none());

        drop(claim);
        assert!(!set.is_claimed(path));
        assert!(set.try_claim(path).is_some());
    }

    #[test]
    fn test_distinct_paths_claim_independently() {
        let set = Arc::new(InFlightSet::default());
        let a = set.try_claim(Path::new("/in/a.pdf")).unwrap();
        let b = set.try_claim(Path::new("/in/b.pdf")).unwrap();
        assert_eq!(set.len(), 2);
        drop(a);
        assert_eq!(set.len(), 1);
        drop(b);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_claim_released_on_panic() {
        let set = Arc::new(InFlightSet::default());
        let path = PathBuf::from("/in/panic.pdf");

        let inner = Arc::clone(&set);
        let inner_path = path.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _claim = inner.try_claim(&inner_path).unwrap();
            panic!("task blew up");
        }));

        assert!(result.is_err());
        assert!(!set.is_claimed(&path));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(UploadStage::ClosedCheck.to_string(), "closed-check");
        assert_eq!(UploadStage::Uploading.as_str(), "uploading");
    }
}
