//! Notify-based directory event source.

use crate::{
    error::{Error, Result},
    events::{FileEvent, FileEventKind},
    traits::{DirectoryEventSource, EventStreams},
};
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{
    new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Directory event source backed by the platform's native notifications.
///
/// Watches a single directory non-recursively. Events are debounced by
/// `notify-debouncer-full`; duplicates that survive debouncing are harmless
/// because the upload coordinator drops events for paths already in flight.
pub struct NotifyEventSource {
    directory: PathBuf,
    /// Debounced file system watcher; `None` once closed.
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    streams: Option<EventStreams>,
}

impl NotifyEventSource {
    /// Start watching `directory`.
    ///
    /// Fails if the watcher cannot be created or the directory cannot be
    /// watched.
    pub fn new(directory: impl Into<PathBuf>, debounce: Duration) -> Result<Self> {
        let directory = directory.into();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        for file_event in Self::convert_notify_event(event) {
                            if event_tx.send(file_event).is_err() {
                                debug!("Event receiver dropped, discarding notify event");
                            }
                        }
                    }
                }
                Err(errors) => {
                    for err in errors {
                        error!("Notify error: {:?}", err);
                        if error_tx.send(Error::from(err)).is_err() {
                            debug!("Error receiver dropped, discarding notify error");
                        }
                    }
                }
            }
        })
        .map_err(|e| Error::Watch(format!("Failed to create notify watcher: {}", e)))?;

        debouncer
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::Watch(format!("Failed to add watcher for {}: {}", directory.display(), e))
            })?;

        info!(directory = %directory.display(), "Notify watcher initialized");
        Ok(Self {
            directory,
            debouncer: Some(debouncer),
            streams: Some(EventStreams {
                events: event_rx,
                errors: error_rx,
            }),
        })
    }

    /// Convert a debounced notify event into one file event per path.
    fn convert_notify_event(event: DebouncedEvent) -> Vec<FileEvent> {
        let kind = match event.event.kind {
            EventKind::Create(_) => FileEventKind::Created,
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
                FileEventKind::Modified
            }
            // The debouncer folds data changes into a preceding `Create`, so a
            // file created and written in one window only shows up as written
            // through the close of its writer.
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => FileEventKind::Modified,
            EventKind::Modify(ModifyKind::Metadata(_)) => FileEventKind::Metadata,
            EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Renamed,
            EventKind::Remove(_) => FileEventKind::Deleted,
            other => FileEventKind::Other(format!("{:?}", other)),
        };

        event
            .event
            .paths
            .into_iter()
            .map(|path| FileEvent::new(kind.clone(), path))
            .collect()
    }

    /// Whether the watch is still active.
    pub fn is_active(&self) -> bool {
        self.debouncer.is_some()
    }
}

impl DirectoryEventSource for NotifyEventSource {
    fn backend_type(&self) -> &'static str {
        "notify"
    }

    fn directory(&self) -> &Path {
        &self.directory
    }

    fn take_streams(&mut self) -> Result<EventStreams> {
        self.streams
            .take()
            .ok_or(Error::SourceConsumed(self.backend_type()))
    }

    fn close(&mut self) {
        // Dropping the debouncer stops the watcher and drops both senders,
        // which closes the streams.
        if self.debouncer.take().is_some() {
            info!(directory = %self.directory.display(), "Removed notify watch");
        }
    }
}

impl Drop for NotifyEventSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for NotifyEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyEventSource")
            .field("directory", &self.directory)
            .field("active", &self.is_active())
            .finish()
    }
}
