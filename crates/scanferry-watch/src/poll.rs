//! Cancellable interval polling shared by the stability and open-handle waits.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `period` unless `cancel` fires first.
pub async fn sleep_or_cancel(period: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(period) => Ok(()),
    }
}

/// A ticker for poll loops that must unwind promptly on cancellation.
///
/// The first [`tick`](IntervalPoll::tick) returns immediately, later ticks
/// wait one interval. Every tick fails with [`Error::Cancelled`] once the
/// token fires, and the wait itself races the token.
///
/// ```ignore
/// let mut poll = IntervalPoll::new(interval, &cancel);
/// loop {
///     poll.tick().await?;
///     if check().await? {
///         break;
///     }
/// }
/// ```
#[derive(Debug)]
pub struct IntervalPoll<'a> {
    interval: Duration,
    cancel: &'a CancellationToken,
    ticks: u64,
}

impl<'a> IntervalPoll<'a> {
    /// Create a ticker firing every `interval`.
    pub fn new(interval: Duration, cancel: &'a CancellationToken) -> Self {
        Self {
            interval,
            cancel,
            ticks: 0,
        }
    }

    /// Wait for the next poll boundary.
    pub async fn tick(&mut self) -> Result<()> {
        if self.ticks > 0 {
            sleep_or_cancel(self.interval, self.cancel).await?;
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.ticks += 1;
        Ok(())
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_tick_is_immediate() {
        let cancel = CancellationToken::new();
        let mut poll = IntervalPoll::new(Duration::from_secs(30), &cancel);

        let start = Instant::now();
        poll.tick().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(poll.ticks(), 1);
    }

    #[tokio::test]
    async fn test_later_ticks_wait_interval() {
        let cancel = CancellationToken::new();
        let mut poll = IntervalPoll::new(Duration::from_millis(20), &cancel);

        let start = Instant::now();
        for _ in 0..3 {
            poll.tick().await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(poll.ticks(), 3);
    }

    #[tokio::test]
    async fn test_tick_returns_promptly_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut poll = IntervalPoll::new(Duration::from_secs(30), &cancel);
        poll.tick().await.unwrap();

        let start = Instant::now();
        let err = poll.tick().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_fails_first_tick() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut poll = IntervalPoll::new(Duration::from_millis(1), &cancel);
        assert!(matches!(poll.tick().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_completes() {
        let cancel = CancellationToken::new();
        sleep_or_cancel(Duration::from_millis(1), &cancel).await.unwrap();
    }
}
