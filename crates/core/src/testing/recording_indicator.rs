//! Progress indicator that records what it was told.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::encoder::ProgressIndicator;

#[derive(Debug, Default)]
pub struct RecordingIndicator {
    values: Mutex<Vec<f64>>,
    clears: AtomicUsize,
    errored: AtomicBool,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fraction passed to `set`, in order.
    pub fn values(&self) -> Vec<f64> {
        self.values.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn clear_calls(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Whether `set_error` was called since the last `clear`.
    pub fn errored(&self) -> bool {
        self.errored.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressIndicator for RecordingIndicator {
    async fn set(&self, fraction: f64) {
        if let Ok(mut values) = self.values.lock() {
            values.push(fraction);
        }
    }

    async fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.errored.store(false, Ordering::SeqCst);
    }

    async fn set_error(&self) {
        self.errored.store(true, Ordering::SeqCst);
    }
}
