//! Size-stabilization polling.
//!
//! A file's size alone cannot prove its writer is done, so stability is a
//! heuristic: the size must stay the same for a number of consecutive polls.
//! The open-handle probe that runs afterwards is the authoritative check.

use crate::error::Result;
use crate::poll::IntervalPoll;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default poll interval for stability and open-handle checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of consecutive equal samples required.
pub const DEFAULT_STABILITY_THRESHOLD: u32 = 10;

/// Tracks consecutive equal size samples.
#[derive(Debug, Clone)]
pub struct SizeTracker {
    threshold: u32,
    last: Option<u64>,
    stable_samples: u32,
}

impl SizeTracker {
    /// Create a tracker that reports stability after `threshold` equal samples.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            last: None,
            stable_samples: 0,
        }
    }

    /// Record a size sample. Returns `true` once the size has been unchanged
    /// for `threshold` consecutive samples.
    ///
    /// The first sample only sets the baseline. Any change resets the count,
    /// so a writer that stalls and then resumes starts over.
    pub fn observe(&mut self, size: u64) -> bool {
        if self.last == Some(size) {
            self.stable_samples += 1;
        } else {
            self.stable_samples = 0;
            self.last = Some(size);
        }
        self.stable_samples >= self.threshold
    }

    /// Consecutive equal samples seen so far.
    pub fn stable_samples(&self) -> u32 {
        self.stable_samples
    }

    /// Last observed size.
    pub fn last_size(&self) -> Option<u64> {
        self.last
    }
}

/// Waits until a file stops growing.
#[derive(Debug, Clone)]
pub struct StabilityDetector {
    interval: Duration,
    threshold: u32,
}

impl StabilityDetector {
    /// Create a detector polling every `interval`, requiring `threshold`
    /// consecutive equal samples.
    pub fn new(interval: Duration, threshold: u32) -> Self {
        Self {
            interval,
            threshold,
        }
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the size of `path` is stable, returning that size.
    ///
    /// Fails immediately if the file cannot be stat'ed (for example because it
    /// was removed) and returns [`crate::Error::Cancelled`] if `cancel` fires.
    pub async fn wait_until_stable(&self, path: &Path, cancel: &CancellationToken) -> Result<u64> {
        info!(path = %path.display(), "Waiting for file to stop growing");
        let mut tracker = SizeTracker::new(self.threshold);
        let mut poll = IntervalPoll::new(self.interval, cancel);

        loop {
            poll.tick().await?;
            let size = tokio::fs::metadata(path).await?.len();
            if tracker.observe(size) {
                debug!(path = %path.display(), size, samples = poll.ticks(), "File size is stable");
                return Ok(size);
            }
        }
    }
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_STABILITY_THRESHOLD)
    }
}
