//! In-process directory event source fed through channels.
//!
//! Useful when events come from somewhere other than the OS (a scanner
//! driver callback, a test harness).

use crate::{
    error::{Error, Result},
    events::FileEvent,
    traits::{DirectoryEventSource, EventStreams},
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending halves shared by a source and all of its injectors.
#[derive(Debug, Default)]
struct Senders {
    events: Option<mpsc::UnboundedSender<FileEvent>>,
    errors: Option<mpsc::UnboundedSender<Error>>,
}

/// Event source whose events are pushed through an [`EventInjector`].
///
/// The source and its injectors share the only senders, so closing either
/// side ends the streams handed out by [`take_streams`](DirectoryEventSource::take_streams).
#[derive(Debug)]
pub struct ChannelEventSource {
    directory: PathBuf,
    senders: Arc<Mutex<Senders>>,
    streams: Option<EventStreams>,
}

/// Sending half of a [`ChannelEventSource`].
#[derive(Debug, Clone)]
pub struct EventInjector {
    senders: Arc<Mutex<Senders>>,
}

impl ChannelEventSource {
    /// Create a source reporting on `directory` and the injector feeding it.
    pub fn new(directory: impl Into<PathBuf>) -> (Self, EventInjector) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let senders = Arc::new(Mutex::new(Senders {
            events: Some(event_tx),
            errors: Some(error_tx),
        }));
        let source = Self {
            directory: directory.into(),
            senders: Arc::clone(&senders),
            streams: Some(EventStreams {
                events: event_rx,
                errors: error_rx,
            }),
        };
        (source, EventInjector { senders })
    }

    /// Whether both streams have been closed.
    pub fn is_closed(&self) -> bool {
        let senders = self.senders.lock();
        senders.events.is_none() && senders.errors.is_none()
    }
}

impl DirectoryEventSource for ChannelEventSource {
    fn backend_type(&self) -> &'static str {
        "channel"
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
        *self.senders.lock() = Senders::default();
        self.streams = None;
    }
}

impl EventInjector {
    /// Push an event. Returns `false` if the stream is closed.
    pub fn send(&self, event: FileEvent) -> bool {
        self.senders
            .lock()
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Push a source error. Returns `false` if the stream is closed.
    pub fn send_error(&self, error: Error) -> bool {
        self.senders
            .lock()
            .errors
            .as_ref()
            .is_some_and(|tx| tx.send(error).is_ok())
    }

    /// Close the event stream for every holder of this source.
    pub fn close_events(&self) {
        self.senders.lock().events = None;
    }

    /// Close the error stream for every holder of this source.
    pub fn close_errors(&self) {
        self.senders.lock().errors = None;
    }
}
