//! Configuration schema for the uploader.

use crate::filter::{IgnoreFilter, DEFAULT_IGNORE_NAMES};
use crate::probe::LsofProbe;
use crate::stability::{StabilityDetector, DEFAULT_STABILITY_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one uploader instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Directory to watch for new files.
    pub input_dir: PathBuf,
    /// Name of the remote folder files are uploaded into.
    pub output_folder: String,
    /// Upload files already present in `input_dir` at startup.
    pub upload_on_startup: bool,
    /// Interval between size samples and open-handle probes.
    pub poll_interval_ms: u64,
    /// Consecutive equal size samples before a file counts as stable.
    pub stability_threshold: u32,
    /// Debounce window of the filesystem event source.
    pub debounce_ms: u64,
    /// Idle time after which the watch loop logs that it is waiting again.
    pub idle_log_interval_ms: u64,
    /// Exact base names that are never uploaded.
    pub ignore_names: Vec<String>,
    /// Explicit `lsof` binary; looked up on `PATH` when unset.
    pub lsof_path: Option<PathBuf>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/share/Scans"),
            output_folder: "Incoming Scans".to_string(),
            upload_on_startup: true,
            poll_interval_ms: 1000,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            debounce_ms: 100,
            idle_log_interval_ms: 1000,
            ignore_names: DEFAULT_IGNORE_NAMES.iter().map(|s| s.to_string()).collect(),
            lsof_path: None,
        }
    }
}

impl UploaderConfig {
    /// Create a configuration for `input_dir` uploading into `output_folder`.
    pub fn new(input_dir: impl Into<PathBuf>, output_folder: impl Into<String>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_folder: output_folder.into(),
            ..Self::default()
        }
    }

    /// Set whether pre-existing files are uploaded at startup.
    pub fn with_upload_on_startup(mut self, enabled: bool) -> Self {
        self.upload_on_startup = enabled;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the stability threshold.
    pub fn with_stability_threshold(mut self, threshold: u32) -> Self {
        self.stability_threshold = threshold;
        self
    }

    /// Set an explicit `lsof` binary.
    pub fn with_lsof_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lsof_path = Some(path.into());
        self
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Idle log interval as a [`Duration`].
    pub fn idle_log_interval(&self) -> Duration {
        Duration::from_millis(self.idle_log_interval_ms)
    }

    /// Build the stability detector described by this configuration.
    pub fn stability_detector(&self) -> StabilityDetector {
        StabilityDetector::new(self.poll_interval(), self.stability_threshold)
    }

    /// Build the ignore filter described by this configuration.
    pub fn ignore_filter(&self) -> IgnoreFilter {
        IgnoreFilter::new(self.ignore_names.iter().cloned())
    }

    /// Build the open-handle probe described by this configuration.
    pub fn probe(&self) -> LsofProbe {
        match &self.lsof_path {
            Some(path) => LsofProbe::with_program(path),
            None => LsofProbe::new(),
        }
    }

    /// Check the configuration for values the uploader cannot work with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(ValidationError::InvalidPath("input_dir is empty".to_string()));
        }
        if self.output_folder.trim().is_empty() {
            return Err(ValidationError::InvalidValue(
                "output_folder".to_string(),
                "must not be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::InvalidValue(
                "poll_interval_ms".to_string(),
                "must be greater than 0".to_string(),
            ));
        }
        if self.stability_threshold == 0 {
            return Err(ValidationError::InvalidValue(
                "stability_threshold".to_string(),
                "must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid path.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid value for a field.
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl From<ValidationError> for crate::Error {
    fn from(err: ValidationError) -> Self {
        crate::Error::Config(err.to_string())
    }
}
