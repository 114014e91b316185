//! System sleep inhibition while jobs are running.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::EncoderError;
use super::traits::{InhibitionHandle, SleepInhibitor};

/// Keeps a helper process alive for as long as sleep must be blocked.
///
/// On Linux this is `systemd-inhibit ... sleep infinity`, on macOS `caffeinate -i`.
pub struct CommandInhibitor {
    command: Vec<String>,
    next_id: AtomicU64,
    children: Mutex<HashMap<u64, Child>>,
}

impl CommandInhibitor {
    /// Creates an inhibitor running `command` (program followed by its arguments).
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            next_id: AtomicU64::new(1),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// The helper command for the current OS, if it has one.
    pub fn platform_command() -> Option<Vec<String>> {
        let command: &[&str] = if cfg!(target_os = "linux") {
            &[
                "systemd-inhibit",
                "--what=idle:sleep",
                "--who=encode-all",
                "--why=Encoding video",
                "--mode=block",
                "sleep",
                "infinity",
            ]
        } else if cfg!(target_os = "macos") {
            &["caffeinate", "-i"]
        } else {
            return None;
        };
        Some(command.iter().map(|s| s.to_string()).collect())
    }

    /// Inhibitor for the current OS, if it has one.
    pub fn platform_default() -> Option<Self> {
        Self::platform_command().map(Self::new)
    }
}

#[async_trait]
impl SleepInhibitor for CommandInhibitor {
    fn name(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("command")
    }

    async fn acquire(&self) -> Result<InhibitionHandle, EncoderError> {
        let (program, args) = self.command.split_first().ok_or_else(|| EncoderError::Inhibit {
            reason: "empty inhibit command".to_string(),
        })?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EncoderError::Inhibit {
                reason: format!("failed to start {}: {}", program, e),
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(inhibitor = %program, pid = ?child.id(), "Sleep inhibition acquired");
        self.children.lock().await.insert(id, child);
        Ok(InhibitionHandle::new(id))
    }

    async fn release(&self, handle: InhibitionHandle) {
        let child = self.children.lock().await.remove(&handle.id());
        if let Some(mut child) = child {
            let _ = child.start_kill();
            let _ = child.wait().await;
            debug!(inhibitor = %self.name(), "Sleep inhibition released");
        }
    }
}

/// Inhibitor that does nothing, for platforms or setups without one.
#[derive(Debug, Default)]
pub struct NoopInhibitor {
    next_id: AtomicU64,
}

#[async_trait]
impl SleepInhibitor for NoopInhibitor {
    fn name(&self) -> &str {
        "noop"
    }

    async fn acquire(&self) -> Result<InhibitionHandle, EncoderError> {
        Ok(InhibitionHandle::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
        ))
    }

    async fn release(&self, _handle: InhibitionHandle) {}
}

#[derive(Debug, Default)]
struct InhibitionState {
    count: usize,
    handle: Option<InhibitionHandle>,
}

/// Reference count of running jobs over one shared inhibition.
///
/// The OS inhibition is taken when the count goes 0 → 1 and dropped on 1 → 0.
pub struct SleepInhibition {
    inhibitor: Arc<dyn SleepInhibitor>,
    state: Mutex<InhibitionState>,
}

impl SleepInhibition {
    pub fn new(inhibitor: Arc<dyn SleepInhibitor>) -> Self {
        Self {
            inhibitor,
            state: Mutex::new(InhibitionState::default()),
        }
    }

    /// Adds one job to the count.
    ///
    /// A failing OS call is logged and the job proceeds without inhibition.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        state.count += 1;
        if state.handle.is_none() {
            match self.inhibitor.acquire().await {
                Ok(handle) => state.handle = Some(handle),
                Err(e) => warn!(inhibitor = %self.inhibitor.name(), "Could not inhibit sleep: {}", e),
            }
        }
    }

    /// Removes one job from the count. Never goes below zero.
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        if state.count == 0 {
            warn!("Sleep inhibition released more often than acquired");
            return;
        }
        state.count -= 1;
        if state.count == 0 {
            if let Some(handle) = state.handle.take() {
                self.inhibitor.release(handle).await;
            }
        }
    }

    /// Number of jobs currently holding the inhibition.
    pub async fn count(&self) -> usize {
        self.state.lock().await.count
    }

    /// Whether an OS-level inhibition is currently held.
    pub async fn is_held(&self) -> bool {
        self.state.lock().await.handle.is_some()
    }
}

impl Default for SleepInhibition {
    fn default() -> Self {
        Self::new(Arc::new(NoopInhibitor::default()))
    }
}
