//! Error types for the encoder module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while supervising an encoding job.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Encoder executable not found.
    #[error("Encoder not found at path: {path}")]
    EncoderNotFound { path: PathBuf },

    /// Encoder executable exists but could not be started.
    #[error("Failed to start encoder {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoder ran and reported failure.
    #[error("{}", describe_exit(.code, .signal))]
    ExitFailure {
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// Job was cancelled.
    #[error("Encoding cancelled")]
    Cancelled,

    /// Per-job log file could not be created.
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A job with this id is already registered.
    #[error("Job already exists: {job_id}")]
    JobExists { job_id: String },

    /// Request cannot be turned into an encoder invocation.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Sleep inhibition could not be acquired.
    #[error("Sleep inhibition failed: {reason}")]
    Inhibit { reason: String },

    /// I/O error while talking to the encoder.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("Encoder exited with code {}", code),
        (None, Some(signal)) => format!("Encoder terminated by signal {}", signal),
        (None, None) => "Encoder exited abnormally".to_string(),
    }
}

impl EncoderError {
    /// Creates an invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Maps a spawn failure, distinguishing a missing executable.
    pub fn from_spawn(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::EncoderNotFound { path }
        } else {
            Self::Spawn { path, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_failure_message_contains_code() {
        let err = EncoderError::ExitFailure {
            code: Some(1),
            signal: None,
        };
        assert_eq!(err.to_string(), "Encoder exited with code 1");
    }

    #[test]
    fn test_exit_failure_signal_message() {
        let err = EncoderError::ExitFailure {
            code: None,
            signal: Some(9),
        };
        assert_eq!(err.to_string(), "Encoder terminated by signal 9");
    }

    #[test]
    fn test_from_spawn_not_found() {
        let err = EncoderError::from_spawn(
            "/missing/ffmpeg",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, EncoderError::EncoderNotFound { .. }));

        let err = EncoderError::from_spawn(
            "/bin/ffmpeg",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, EncoderError::Spawn { .. }));
    }
}
