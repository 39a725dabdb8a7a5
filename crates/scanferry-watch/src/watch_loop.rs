//! The dispatcher turning directory events into upload tasks.

use crate::coordinator::UploadCoordinator;
use crate::error::{Error, Result};
use crate::events::FileEvent;
use crate::filter::IgnoreFilter;
use crate::traits::EventStreams;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the dispatcher did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// An upload task was spawned.
    Scheduled,
    /// The path is already owned by an upload task.
    InFlight,
    /// The event is not a content write.
    NotWrite,
    /// The path matches the ignore rules.
    Ignored,
    /// The file was gone by the time the event was handled.
    Missing,
}

/// Single dispatcher for one watched directory.
///
/// Spawned upload tasks are detached: the loop never waits for them, and its
/// own exit does not stop them unless the shared token is cancelled.
#[derive(Debug)]
pub struct WatchLoop {
    directory: PathBuf,
    filter: IgnoreFilter,
    coordinator: Arc<UploadCoordinator>,
    upload_on_startup: bool,
    idle_log_interval: Duration,
}

impl WatchLoop {
    /// Create a dispatcher for `directory`.
    pub fn new(
        directory: impl Into<PathBuf>,
        filter: IgnoreFilter,
        coordinator: Arc<UploadCoordinator>,
    ) -> Self {
        Self {
            directory: directory.into(),
            filter,
            coordinator,
            upload_on_startup: true,
            idle_log_interval: Duration::from_secs(1),
        }
    }

    /// Enable or disable the startup sweep.
    pub fn with_upload_on_startup(mut self, enabled: bool) -> Self {
        self.upload_on_startup = enabled;
        self
    }

    /// Set how long the loop must be idle before it logs that it is waiting.
    pub fn with_idle_log_interval(mut self, interval: Duration) -> Self {
        self.idle_log_interval = interval;
        self
    }

    /// Watched directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Sweep the directory once, then dispatch events until the source ends
    /// or `cancel` fires.
    ///
    /// Returns `Ok(())` when the event stream closes, the last reported source
    /// error (or `Ok(())`) when the error stream closes, and
    /// [`Error::Cancelled`] on cancellation.
    pub async fn run(&self, streams: EventStreams, cancel: &CancellationToken) -> Result<()> {
        if self.upload_on_startup {
            self.initial_sweep(cancel).await?;
        }
        self.dispatch(streams, cancel).await
    }

    /// Schedule an upload for every eligible file already in the directory.
    /// Returns how many tasks were spawned.
    pub async fn initial_sweep(&self, cancel: &CancellationToken) -> Result<usize> {
        info!(directory = %self.directory.display(), "Looking for files already in directory");
        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|e| {
            Error::Watch(format!(
                "Failed to list directory contents of {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        let mut scheduled = 0;
        while let Some(entry) = entries.next_entry().await? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let path = entry.path();
            if self.filter.should_ignore(&path) {
                debug!(path = %path.display(), "Ignoring file");
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {
                    debug!(path = %path.display(), "Skipping directory");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), "Failed to read file type: {}", e);
                    continue;
                }
            }
            self.coordinator.spawn(path, cancel.clone());
            scheduled += 1;
        }

        info!(scheduled, "Startup sweep finished");
        Ok(scheduled)
    }

    async fn dispatch(&self, mut streams: EventStreams, cancel: &CancellationToken) -> Result<()> {
        let mut last_error: Option<Error> = None;
        let mut last_wake: Option<Instant> = None;

        loop {
            if last_wake.map_or(true, |at| at.elapsed() > self.idle_log_interval) {
                info!(directory = %self.directory.display(), "Waiting for new files");
            }
            last_wake = Some(Instant::now());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Watch loop cancelled");
                    return Err(Error::Cancelled);
                }
                event = streams.events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event, cancel).await;
                    }
                    None => {
                        info!("Event stream closed, stopping watch loop");
                        return Ok(());
                    }
                },
                error = streams.errors.recv() => match error {
                    Some(error) => {
                        warn!("Event source error: {}", error);
                        last_error = Some(error);
                    }
                    None => {
                        info!("Error stream closed, stopping watch loop");
                        return last_error.map_or(Ok(()), Err);
                    }
                },
            }
        }
    }

    /// Filter one event and spawn an upload task if it qualifies.
    pub async fn handle_event(&self, event: FileEvent, cancel: &CancellationToken) -> Disposition {
        let path = event.path;
        if self.coordinator.is_claimed(&path) {
            return Disposition::InFlight;
        }
        if !event.kind.is_write() {
            return Disposition::NotWrite;
        }
        if self.filter.should_ignore(&path) {
            debug!(path = %path.display(), "Ignoring file");
            return Disposition::Ignored;
        }
        if let Err(e) = tokio::fs::metadata(&path).await {
            if e.kind() == std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), "File already removed, ignoring event");
                return Disposition::Missing;
            }
        }

        info!(path = %path.display(), "Found new file");
        self.coordinator.spawn(path, cancel.clone());
        Disposition::Scheduled
    }
}
