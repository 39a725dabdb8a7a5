//! The uploader: one watched directory, one destination folder.

use crate::backends::NotifyEventSource;
use crate::config::UploaderConfig;
use crate::coordinator::UploadCoordinator;
use crate::error::{Error, Result};
use crate::traits::{DirectoryEventSource, FolderId, HandleProbe, RemoteStore};
use crate::watch_loop::WatchLoop;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Watches a directory and ships every finished file to a remote folder.
pub struct Uploader {
    source: Box<dyn DirectoryEventSource>,
    coordinator: Arc<UploadCoordinator>,
    watch_loop: WatchLoop,
}

impl Uploader {
    /// Watch `config.input_dir` with native notifications and upload into
    /// `config.output_folder` of `store`.
    ///
    /// Fails if the directory cannot be watched or the folder cannot be
    /// resolved.
    pub async fn new(config: UploaderConfig, store: Arc<dyn RemoteStore>) -> Result<Self> {
        config.validate()?;
        let directory = std::fs::canonicalize(&config.input_dir).map_err(|e| {
            Error::InvalidPath(format!("{}: {}", config.input_dir.display(), e))
        })?;
        let source = NotifyEventSource::new(directory, config.debounce())?;
        let probe = Arc::new(config.probe());
        Self::with_source(config, Box::new(source), store, probe).await
    }

    /// Build an uploader from explicit collaborators.
    ///
    /// The watched directory is the one reported by `source`.
    pub async fn with_source(
        config: UploaderConfig,
        source: Box<dyn DirectoryEventSource>,
        store: Arc<dyn RemoteStore>,
        probe: Arc<dyn HandleProbe>,
    ) -> Result<Self> {
        config.validate()?;
        let folder: FolderId = store.resolve_folder(&config.output_folder).await?;
        info!(
            folder = %config.output_folder,
            folder_id = %folder,
            store = store.name(),
            "Resolved destination folder"
        );

        let coordinator = Arc::new(UploadCoordinator::new(
            store,
            folder,
            probe,
            config.stability_detector(),
        ));
        let watch_loop = WatchLoop::new(
            source.directory().to_path_buf(),
            config.ignore_filter(),
            Arc::clone(&coordinator),
        )
        .with_upload_on_startup(config.upload_on_startup)
        .with_idle_log_interval(config.idle_log_interval());

        Ok(Self {
            source,
            coordinator,
            watch_loop,
        })
    }

    /// Watched directory.
    pub fn directory(&self) -> &Path {
        self.watch_loop.directory()
    }

    /// The coordinator shared by all upload tasks.
    pub fn coordinator(&self) -> &Arc<UploadCoordinator> {
        &self.coordinator
    }

    /// Run until `cancel` fires or the event source ends.
    ///
    /// Returns [`Error::Cancelled`] on cancellation, `Ok(())` when the source
    /// closes cleanly, or the error the source reported.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let streams = self.source.take_streams()?;
        info!(
            directory = %self.directory().display(),
            backend = self.source.backend_type(),
            "Uploader running"
        );
        self.watch_loop.run(streams, &cancel).await
    }

    /// Release the directory watch. Safe to call more than once.
    pub fn close(&mut self) {
        self.source.close();
    }
}

impl Drop for Uploader {
    fn drop(&mut self) {
        self.source.close();
    }
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("backend", &self.source.backend_type())
            .field("directory", &self.directory())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
