//! Spawning and supervising a single encoder process.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Notify;
use tracing::debug;

use super::error::EncoderError;
use super::log_parser::ProgressParser;
use super::traits::OutputObserver;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Forcibly terminates the process it was taken from.
///
/// Triggering before the supervisor starts waiting is not lost.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    notify: Arc<Notify>,
}

impl KillSwitch {
    fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }

    /// Requests termination. Best effort; does not wait for the process to exit.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

/// A running encoder with its diagnostic stream attached.
#[derive(Debug)]
pub struct EncoderProcess {
    executable: PathBuf,
    child: Child,
    stderr: ChildStderr,
    kill: KillSwitch,
}

impl EncoderProcess {
    /// Starts the encoder. Fails immediately if it cannot be executed.
    pub fn spawn(executable: &Path, args: &[String]) -> Result<Self, EncoderError> {
        let mut command = Command::new(executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(0x0800_0000); // CREATE_NO_WINDOW

        let mut child = command
            .spawn()
            .map_err(|e| EncoderError::from_spawn(executable, e))?;

        let stderr = child.stderr.take().ok_or_else(|| {
            EncoderError::Io(std::io::Error::other("encoder stderr was not captured"))
        })?;

        debug!(executable = %executable.display(), pid = ?child.id(), "Encoder spawned");

        Ok(Self {
            executable: executable.to_path_buf(),
            child,
            stderr,
            kill: KillSwitch::new(),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    /// Streams the diagnostic output into the parser and observer until the
    /// process exits.
    ///
    /// Resolves `Ok` only for exit status 0. A triggered kill switch resolves
    /// with [`EncoderError::Cancelled`].
    pub async fn supervise(
        self,
        parser: &mut ProgressParser,
        observer: &mut dyn OutputObserver,
    ) -> Result<(), EncoderError> {
        let Self {
            executable,
            mut child,
            mut stderr,
            kill,
        } = self;

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut decoder = Utf8Decoder::default();

        loop {
            tokio::select! {
                _ = kill.notify.notified() => {
                    return terminate(&mut child, &executable).await;
                }
                read = stderr.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        break;
                    }
                    let text = decoder.decode(&buf[..n]);
                    forward(&text, parser, observer).await;
                }
            }
        }

        let rest = decoder.finish();
        forward(&rest, parser, observer).await;

        let status = tokio::select! {
            _ = kill.notify.notified() => {
                return terminate(&mut child, &executable).await;
            }
            status = child.wait() => status?,
        };

        debug!(executable = %executable.display(), status = %status, "Encoder exited");
        check_status(status)
    }
}

async fn forward(text: &str, parser: &mut ProgressParser, observer: &mut dyn OutputObserver) {
    if text.is_empty() {
        return;
    }
    observer.on_output(text).await;
    if let Some(fraction) = parser.feed(text) {
        observer.on_progress(fraction).await;
    }
}

async fn terminate(child: &mut Child, executable: &Path) -> Result<(), EncoderError> {
    debug!(executable = %executable.display(), pid = ?child.id(), "Killing encoder");
    let _ = child.start_kill();
    let _ = child.wait().await;
    Err(EncoderError::Cancelled)
}

fn check_status(status: ExitStatus) -> Result<(), EncoderError> {
    if status.success() {
        return Ok(());
    }
    Err(EncoderError::ExitFailure {
        code: status.code(),
        signal: exit_signal(&status),
    })
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Decodes UTF-8 from a byte stream whose reads may split a character.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
        out
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).to_string();
        self.pending.clear();
        rest
    }
}
