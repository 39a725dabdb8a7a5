//! End-to-end tests for the uploader, driven through an in-process event
//! source and through the native notify watcher.

use async_trait::async_trait;
use parking_lot::Mutex;
use scanferry_watch::{
    ChannelEventSource, Error, EventInjector, FileEvent, FolderId, HandleProbe, ProgressFn,
    RemoteFile, RemoteStore, Result, StabilityDetector, UploadCoordinator, UploadOutcome,
    UploadSource, Uploader, UploaderConfig,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

#[derive(Default)]
struct RecordingStore {
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    fail_resolve: bool,
    fail_upload: bool,
    /// Remove the local file from this directory while uploading it.
    remove_local_from: Option<PathBuf>,
}

impl RecordingStore {
    fn names(&self) -> Vec<String> {
        self.uploads.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    fn count(&self) -> usize {
        self.uploads.lock().len()
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn resolve_folder(&self, name: &str) -> Result<FolderId> {
        if self.fail_resolve {
            return Err(Error::Remote(format!("folder {} not found", name)));
        }
        Ok(FolderId::new("folder-1"))
    }

    async fn upload(
        &self,
        mut source: UploadSource,
        folder: &FolderId,
        progress: ProgressFn,
    ) -> Result<RemoteFile> {
        assert_eq!(folder.as_str(), "folder-1");
        if self.fail_upload {
            return Err(Error::Remote("quota exceeded".to_string()));
        }
        let mut body = Vec::new();
        source.file.read_to_end(&mut body).await?;
        progress(scanferry_watch::UploadProgress {
            sent: body.len() as u64,
            total: source.size,
        });
        if let Some(dir) = &self.remove_local_from {
            std::fs::remove_file(dir.join(&source.name))?;
        }
        self.uploads.lock().push((source.name.clone(), body));
        Ok(RemoteFile {
            id: format!("id-{}", source.name),
            name: source.name,
        })
    }
}

/// Probe with a fixed answer that counts its calls.
struct FixedProbe {
    answer: std::result::Result<bool, String>,
    calls: AtomicUsize,
}

impl FixedProbe {
    fn closed() -> Self {
        Self {
            answer: Ok(false),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(msg: &str) -> Self {
        Self {
            answer: Err(msg.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HandleProbe for FixedProbe {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn is_open(&self, _path: &Path, _cancel: &CancellationToken) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(Error::Probe)
    }
}

fn test_config(dir: &Path) -> UploaderConfig {
    let mut config = UploaderConfig::new(dir, "Scans")
        .with_poll_interval(Duration::from_millis(5))
        .with_stability_threshold(2);
    config.idle_log_interval_ms = 10;
    config
}

async fn start(
    config: UploaderConfig,
    store: Arc<RecordingStore>,
    probe: Arc<FixedProbe>,
) -> (JoinHandle<Result<()>>, EventInjector, CancellationToken) {
    let (source, injector) = ChannelEventSource::new(config.input_dir.clone());
    let mut uploader = Uploader::with_source(config, Box::new(source), store, probe)
        .await
        .expect("uploader setup");
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { uploader.run(run_cancel).await });
    (handle, injector, cancel)
}

async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

fn write(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn test_written_file_is_uploaded_and_removed() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::default());
    let (handle, injector, cancel) = start(
        test_config(temp.path()).with_upload_on_startup(false),
        Arc::clone(&store),
        Arc::new(FixedProbe::closed()),
    )
    .await;

    let scan = write(temp.path(), "scan-001.pdf", b"%PDF-1.7 page one");
    injector.send(FileEvent::modified(&scan));

    wait_for("local copy removal", || !scan.exists()).await;
    let uploads = store.uploads.lock().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "scan-001.pdf");
    assert_eq!(uploads[0].1, b"%PDF-1.7 page one");

    // A late event for the removed file is a no-op.
    injector.send(FileEvent::modified(&scan));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.count(), 1);

    cancel.cancel();
    assert!(matches!(handle.await.unwrap(), Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_duplicate_events_upload_once() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::default());
    let (handle, injector, cancel) = start(
        test_config(temp.path()).with_upload_on_startup(false),
        Arc::clone(&store),
        Arc::new(FixedProbe::closed()),
    )
    .await;

    let scan = write(temp.path(), "burst.pdf", b"burst of writes");
    for _ in 0..25 {
        injector.send(FileEvent::modified(&scan));
    }

    wait_for("local copy removal", || !scan.exists()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.names(), vec!["burst.pdf".to_string()]);

    cancel.cancel();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_startup_sweep_uploads_existing_files_but_not_ignored_ones() {
    let temp = TempDir::new().unwrap();
    let a = write(temp.path(), "a.pdf", b"a");
    let b = write(temp.path(), "b.jpg", b"bb");
    let ds_store = write(temp.path(), ".DS_Store", b"finder");
    let hidden = write(temp.path(), ".partial", b"hidden");

    let store = Arc::new(RecordingStore::default());
    let (handle, _injector, cancel) = start(
        test_config(temp.path()),
        Arc::clone(&store),
        Arc::new(FixedProbe::closed()),
    )
    .await;

    wait_for("startup uploads", || !a.exists() && !b.exists()).await;
    let mut names = store.names();
    names.sort();
    assert_eq!(names, vec!["a.pdf".to_string(), "b.jpg".to_string()]);
    assert!(ds_store.exists());
    assert!(hidden.exists());

    cancel.cancel();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_startup_sweep_can_be_disabled() {
    let temp = TempDir::new().unwrap();
    let existing = write(temp.path(), "old.pdf", b"old");

    let store = Arc::new(RecordingStore::default());
    let (handle, _injector, cancel) = start(
        test_config(temp.path()).with_upload_on_startup(false),
        Arc::clone(&store),
        Arc::new(FixedProbe::closed()),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.count(), 0);
    assert!(existing.exists());

    cancel.cancel();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_ignored_event_never_uploads() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::default());
    let (handle, injector, cancel) = start(
        test_config(temp.path()).with_upload_on_startup(false),
        Arc::clone(&store),
        Arc::new(FixedProbe::closed()),
    )
    .await;

    let ds_store = write(temp.path(), ".DS_Store", b"finder");
    injector.send(FileEvent::modified(&ds_store));
    injector.send(FileEvent::modified(temp.path().join("missing.pdf")));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.count(), 0);
    assert!(ds_store.exists());

    cancel.cancel();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_probe_error_leaves_file_in_place() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::default());
    let probe = Arc::new(FixedProbe::failing("lsof: WARNING: can't stat()"));
    let (source, injector) = ChannelEventSource::new(temp.path());
    let mut uploader = Uploader::with_source(
        test_config(temp.path()).with_upload_on_startup(false),
        Box::new(source),
        Arc::clone(&store) as Arc<dyn RemoteStore>,
        Arc::clone(&probe) as Arc<dyn HandleProbe>,
    )
    .await
    .unwrap();
    let coordinator = Arc::clone(uploader.coordinator());
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { uploader.run(run_cancel).await });

    let scan = write(temp.path(), "locked.pdf", b"busy");
    injector.send(FileEvent::modified(&scan));

    wait_for("probe call", || probe.calls.load(Ordering::SeqCst) > 0).await;
    wait_for("claim release", || coordinator.in_flight() == 0).await;
    assert_eq!(store.count(), 0);
    assert!(scan.exists());

    cancel.cancel();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_upload_failure_keeps_local_file() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore {
        fail_upload: true,
        ..Default::default()
    });
    let (source, injector) = ChannelEventSource::new(temp.path());
    let mut uploader = Uploader::with_source(
        test_config(temp.path()).with_upload_on_startup(false),
        Box::new(source),
        Arc::clone(&store) as Arc<dyn RemoteStore>,
        Arc::new(FixedProbe::closed()),
    )
    .await
    .unwrap();
    let coordinator = Arc::clone(uploader.coordinator());
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { uploader.run(run_cancel).await });

    let scan = write(temp.path(), "retry-me.pdf", b"data");
    injector.send(FileEvent::modified(&scan));

    tokio::time::sleep(Duration::from_millis(100)).await;
    wait_for("claim release", || coordinator.in_flight() == 0).await;
    assert!(scan.exists());

    cancel.cancel();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_cancellation_returns_promptly() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::default());
    let (handle, injector, cancel) = start(
        test_config(temp.path())
            .with_upload_on_startup(false)
            .with_stability_threshold(10_000),
        Arc::clone(&store),
        Arc::new(FixedProbe::closed()),
    )
    .await;

    let scan = write(temp.path(), "slow.pdf", b"still scanning");
    injector.send(FileEvent::modified(&scan));
    tokio::time::sleep(Duration::from_millis(30)).await;

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("run returns within a second")
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(store.count(), 0);
    assert!(scan.exists());
}

#[tokio::test]
async fn test_event_stream_close_ends_run_cleanly() {
    let temp = TempDir::new().unwrap();
    let (handle, injector, _cancel) = start(
        test_config(temp.path()).with_upload_on_startup(false),
        Arc::new(RecordingStore::default()),
        Arc::new(FixedProbe::closed()),
    )
    .await;

    injector.close_events();
    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_error_stream_close_reports_last_source_error() {
    let temp = TempDir::new().unwrap();
    let (handle, injector, _cancel) = start(
        test_config(temp.path()).with_upload_on_startup(false),
        Arc::new(RecordingStore::default()),
        Arc::new(FixedProbe::closed()),
    )
    .await;

    injector.send_error(Error::Watch("inotify queue overflow".to_string()));
    injector.close_errors();
    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    match result {
        Err(Error::Watch(msg)) => assert_eq!(msg, "inotify queue overflow"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_unresolvable_folder_fails_setup() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore {
        fail_resolve: true,
        ..Default::default()
    });
    let (source, _injector) = ChannelEventSource::new(temp.path());
    let result = Uploader::with_source(
        test_config(temp.path()),
        Box::new(source),
        store,
        Arc::new(FixedProbe::closed()),
    )
    .await;
    assert!(matches!(result, Err(Error::Remote(_))));
}

#[tokio::test]
async fn test_invalid_config_fails_setup() {
    let temp = TempDir::new().unwrap();
    let (source, _injector) = ChannelEventSource::new(temp.path());
    let result = Uploader::with_source(
        test_config(temp.path()).with_stability_threshold(0),
        Box::new(source),
        Arc::new(RecordingStore::default()),
        Arc::new(FixedProbe::closed()),
    )
    .await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_missing_directory_fails_native_setup() {
    let temp = TempDir::new().unwrap();
    let config = UploaderConfig::new(temp.path().join("absent"), "Scans");
    let result = Uploader::new(config, Arc::new(RecordingStore::default())).await;
    assert!(matches!(result, Err(Error::InvalidPath(_))));
}

#[tokio::test]
#[traced_test]
async fn test_failed_local_delete_keeps_upload_and_releases_claim() {
    let temp = TempDir::new().unwrap();
    let scan = write(temp.path(), "scan.pdf", b"%PDF-1.7");
    let store = Arc::new(RecordingStore {
        remove_local_from: Some(temp.path().to_path_buf()),
        ..Default::default()
    });
    let coordinator = Arc::new(UploadCoordinator::new(
        store.clone(),
        FolderId::new("folder-1"),
        Arc::new(FixedProbe::closed()),
        StabilityDetector::new(Duration::from_millis(5), 2),
    ));

    let outcome = coordinator.process(&scan, &CancellationToken::new()).await;

    match outcome {
        UploadOutcome::Uploaded {
            remote,
            removed_local,
        } => {
            assert_eq!(remote.id, "id-scan.pdf");
            assert!(!removed_local);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(store.count(), 1);
    assert!(!coordinator.is_claimed(&scan));
    assert_eq!(coordinator.in_flight(), 0);
    assert!(logs_contain("Failed to delete file"));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_native_watcher_uploads_freshly_written_file() {
    use std::io::Write;

    let temp = TempDir::new().unwrap();
    let dir = temp.path().canonicalize().unwrap();
    let store = Arc::new(RecordingStore::default());

    // `false` exits 1 without diagnostics, which reads as "no open handles".
    let mut config = test_config(&dir)
        .with_upload_on_startup(false)
        .with_lsof_path(which::which("false").unwrap());
    config.debounce_ms = 50;

    let mut uploader = Uploader::new(config, store.clone()).await.unwrap();
    assert_eq!(uploader.directory(), dir.as_path());
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { uploader.run(run_cancel).await });

    let scan = dir.join("receipt.pdf");
    let mut file = std::fs::File::create(&scan).unwrap();
    file.write_all(b"%PDF-1.7 receipt").unwrap();
    drop(file);

    wait_for("local copy removal", || !scan.exists()).await;
    let uploads = store.uploads.lock().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "receipt.pdf");
    assert_eq!(uploads[0].1, b"%PDF-1.7 receipt");

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
}
