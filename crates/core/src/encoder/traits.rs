//! Trait definitions for the encoder module.

use async_trait::async_trait;

use super::error::EncoderError;

/// Receives what one encoder process reports while it runs.
#[async_trait]
pub trait OutputObserver: Send {
    /// A decoded chunk of the diagnostic stream, in pipe order.
    async fn on_output(&mut self, chunk: &str);

    /// Progress of the current process in `[0, 1]`.
    async fn on_progress(&mut self, fraction: f64);
}

/// Opaque token returned by a [`SleepInhibitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InhibitionHandle(u64);

impl InhibitionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// OS facility that keeps the machine from suspending.
#[async_trait]
pub trait SleepInhibitor: Send + Sync {
    /// Returns the name of this inhibitor implementation.
    fn name(&self) -> &str;

    /// Starts blocking system sleep.
    async fn acquire(&self) -> Result<InhibitionHandle, EncoderError>;

    /// Stops blocking system sleep for the given handle.
    async fn release(&self, handle: InhibitionHandle);
}

/// Taskbar / dock progress display.
#[async_trait]
pub trait ProgressIndicator: Send + Sync {
    /// Shows progress in `[0, 1]`.
    async fn set(&self, fraction: f64);

    /// Removes the indicator.
    async fn clear(&self);

    /// Marks the indicator as failed.
    async fn set_error(&self);
}

/// Indicator for hosts without a taskbar.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

#[async_trait]
impl ProgressIndicator for NoopIndicator {
    async fn set(&self, _fraction: f64) {}

    async fn clear(&self) {}

    async fn set_error(&self) {}
}
