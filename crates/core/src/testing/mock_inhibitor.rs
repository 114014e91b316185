//! Mock sleep inhibitor for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::encoder::{EncoderError, InhibitionHandle, SleepInhibitor};

/// Mock implementation of the SleepInhibitor trait.
///
/// Counts calls and can be told to fail acquisition.
///
/// # Example
///
/// ```rust,ignore
/// use encodeall_core::testing::MockInhibitor;
///
/// let inhibitor = Arc::new(MockInhibitor::new());
/// let supervisor = EncodingSupervisor::new(config).with_inhibitor(inhibitor.clone());
///
/// // ... run a job ...
/// assert_eq!(inhibitor.acquire_calls(), 1);
/// assert!(!inhibitor.is_held());
/// ```
#[derive(Debug, Default)]
pub struct MockInhibitor {
    next_id: AtomicU64,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    fail: AtomicBool,
}

impl MockInhibitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent acquisitions fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of OS-level acquisitions attempted.
    pub fn acquire_calls(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Whether an acquisition is outstanding.
    pub fn is_held(&self) -> bool {
        !self.fail.load(Ordering::SeqCst) && self.acquire_calls() > self.release_calls()
    }
}

#[async_trait]
impl SleepInhibitor for MockInhibitor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn acquire(&self) -> Result<InhibitionHandle, EncoderError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EncoderError::Inhibit {
                reason: "mock failure".to_string(),
            });
        }
        Ok(InhibitionHandle::new(
            self.next_id.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn release(&self, _handle: InhibitionHandle) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
