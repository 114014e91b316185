//! Per-job log file holding the encoder's raw diagnostic output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::error::EncoderError;

/// Where a job's log goes.
///
/// An explicit directory wins, then a `logs_<timestamp>` folder next to the
/// output, then a sibling `<output>.log`.
pub fn resolve_log_path(
    output_path: &Path,
    log_directory: Option<&Path>,
    job_timestamp: Option<&str>,
) -> PathBuf {
    let file_name = output_path
        .file_name()
        .map(|name| format!("{}.log", name.to_string_lossy()))
        .unwrap_or_else(|| "encode.log".to_string());

    if let Some(dir) = log_directory {
        return dir.join(file_name);
    }
    if let Some(ts) = job_timestamp {
        let parent = output_path.parent().unwrap_or_else(|| Path::new(""));
        return parent.join(format!("logs_{}", ts)).join(file_name);
    }
    let mut sibling = output_path.as_os_str().to_owned();
    sibling.push(".log");
    PathBuf::from(sibling)
}

/// Shared handle to an open log file. Closing is idempotent.
#[derive(Debug, Clone)]
pub struct JobLog {
    path: PathBuf,
    file: Arc<Mutex<Option<File>>>,
}

impl JobLog {
    /// Creates parent directories and truncates or creates the file.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, EncoderError> {
        let path = path.into();
        let log_err = |source| EncoderError::LogFile {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(log_err)?;
        }
        let file = File::create(&path).await.map_err(log_err)?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(Some(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a chunk. Writes after close are dropped.
    pub async fn write(&self, chunk: &str) {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(chunk.as_bytes()).await {
                warn!(path = %self.path.display(), error = %e, "Failed to write job log");
            }
        }
    }

    /// Flushes and closes the file.
    pub async fn close(&self) {
        let file = self.file.lock().await.take();
        if let Some(mut file) = file {
            if let Err(e) = file.flush().await {
                warn!(path = %self.path.display(), error = %e, "Failed to flush job log");
            }
        }
    }

    pub async fn is_open(&self) -> bool {
        self.file.lock().await.is_some()
    }
}
