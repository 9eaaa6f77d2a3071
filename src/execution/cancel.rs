//! Run Cancellation
//!
//! Cancellation is cooperative: the run loop checks the token at step
//! boundaries, and every delay the engine itself introduces goes through
//! [`CancelToken::sleep`] so it ends as soon as the token fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Marker returned when an interruptible wait was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Per-run cancellation handle. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Fails fast if the token has fired.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.check()?;
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.inner.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub async fn sleep_ms(&self, millis: u64) -> Result<(), Cancelled> {
        self.sleep(Duration::from_millis(millis)).await
    }
}
