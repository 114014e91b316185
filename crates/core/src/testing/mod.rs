//! Testing utilities: mock OS boundaries and a scriptable fake encoder.
//!
//! # Example
//!
//! ```rust,ignore
//! use encodeall_core::testing::{fixtures, MockInhibitor, RecordingIndicator};
//!
//! let dir = tempfile::TempDir::new()?;
//! let encoder = fixtures::write_fake_encoder(dir.path(), fixtures::PROGRESS_SCRIPT)?;
//! let request = fixtures::request(dir.path(), &encoder);
//!
//! let supervisor = EncodingSupervisor::new(EncoderConfig::default())
//!     .with_inhibitor(Arc::new(MockInhibitor::new()))
//!     .with_indicator(Arc::new(RecordingIndicator::new()));
//! ```

mod mock_inhibitor;
mod recording_indicator;

pub use mock_inhibitor::MockInhibitor;
pub use recording_indicator::RecordingIndicator;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::encoder::EncodingRequest;

    /// Reports a 10 second input, encodes it in two steps and exits 0.
    ///
    /// Every invocation appends its arguments to `<script>.calls`, and a
    /// `-passlogfile` prefix gets its statistics files created.
    pub const PROGRESS_SCRIPT: &str = r#"echo "$@" >> "$0.calls"
prefix=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-passlogfile" ]; then prefix="$2"; fi
  shift
done
if [ -n "$prefix" ]; then
  : > "$prefix-0.log"
  : > "$prefix-0.log.mbtree"
fi
printf 'Input #0, matroska,webm, from in.mkv:\n  Duration: 00:00:10.00, start: 0.000000, bitrate: 1000 kb/s\n' >&2
printf 'frame=  120 fps= 60 q=28.0 size=    512kB time=00:00:05.00 bitrate= 838.9kbits/s speed=2x\r' >&2
printf 'frame=  240 fps= 60 q=28.0 size=   1024kB time=00:00:10.00 bitrate= 838.9kbits/s speed=2x\r' >&2
exit 0
"#;

    /// Prints an error and exits 1.
    pub const FAILING_SCRIPT: &str = r#"echo "$@" >> "$0.calls"
printf 'in.mp4: No such file or directory\n' >&2
exit 1
"#;

    /// Reports a duration, then blocks until killed.
    pub const HANGING_SCRIPT: &str = r#"printf 'Duration: 00:10:00.00, start: 0.000000\n' >&2
exec sleep 30
"#;

    /// Reports a duration, then prints a line every 100ms until killed.
    pub const TICKING_SCRIPT: &str = r#"printf 'Duration: 00:10:00.00, start: 0.000000\n' >&2
i=0
while [ $i -lt 600 ]; do
  printf 'tick %d\n' "$i" >&2
  i=$((i + 1))
  sleep 0.1
done
"#;

    /// Writes an executable `/bin/sh` script standing in for ffmpeg.
    #[cfg(unix)]
    pub fn write_fake_encoder(dir: &Path, body: &str) -> std::io::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Arguments of every invocation of a fake encoder, one line each.
    pub fn recorded_calls(encoder: &Path) -> Vec<String> {
        let mut calls = encoder.as_os_str().to_owned();
        calls.push(".calls");
        std::fs::read_to_string(PathBuf::from(calls))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// A default request from `<dir>/in.mp4` to `<dir>/out.mkv` run by `encoder`.
    pub fn request(dir: &Path, encoder: &Path) -> EncodingRequest {
        let mut request = EncodingRequest::new(dir.join("in.mp4"), dir.join("out.mkv"));
        request.encoder_path = Some(encoder.to_path_buf());
        request
    }
}
