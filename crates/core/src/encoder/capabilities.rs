//! Encoder installation and hardware capability detection.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::error::EncoderError;

/// Whether the configured encoder can be run, and which version it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderStatus {
    pub installed: bool,
    pub version: Option<String>,
    pub path: PathBuf,
    pub error: Option<String>,
}

impl EncoderStatus {
    /// Runs `<ffmpeg> -version` and reports what it finds.
    pub async fn check(ffmpeg_path: &Path) -> Self {
        let output = Command::new(ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => {
                let stdout = String::from_utf8_lossy(&o.stdout);
                Self {
                    installed: true,
                    version: parse_version(&stdout),
                    path: ffmpeg_path.to_path_buf(),
                    error: None,
                }
            }
            Ok(o) => Self {
                installed: false,
                version: None,
                path: ffmpeg_path.to_path_buf(),
                error: Some(
                    EncoderError::ExitFailure {
                        code: o.status.code(),
                        signal: None,
                    }
                    .to_string(),
                ),
            },
            Err(e) => {
                debug!(path = %ffmpeg_path.display(), error = %e, "Encoder check failed");
                Self {
                    installed: false,
                    version: None,
                    path: ffmpeg_path.to_path_buf(),
                    error: Some(EncoderError::from_spawn(ffmpeg_path, e).to_string()),
                }
            }
        }
    }
}

/// Extracts `6.1.1` from `ffmpeg version 6.1.1 Copyright ...`.
fn parse_version(output: &str) -> Option<String> {
    let first = output.lines().next()?;
    let mut words = first.split_whitespace();
    words.find(|w| *w == "version")?;
    words.next().map(str::to_string)
}

/// Hardware encoders the installed ffmpeg was built with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    /// NVIDIA NVENC (h264/hevc/av1)
    pub nvenc: Vec<String>,
    /// Intel Quick Sync
    pub qsv: Vec<String>,
    /// AMD AMF
    pub amf: Vec<String>,
    /// VA-API (Linux)
    pub vaapi: Vec<String>,
    /// Apple VideoToolbox
    pub videotoolbox: Vec<String>,
}

impl EncoderCapabilities {
    /// Runs `<ffmpeg> -encoders`. An encoder that cannot be run has no capabilities.
    pub async fn detect(ffmpeg_path: &Path) -> Self {
        let output = Command::new(ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Self::parse(&String::from_utf8_lossy(&o.stdout)),
            _ => Self::default(),
        }
    }

    /// Parses the encoder table printed by `ffmpeg -encoders`.
    pub fn parse(listing: &str) -> Self {
        let mut caps = Self::default();
        for line in listing.lines() {
            // " V....D h264_nvenc           NVIDIA NVENC H.264 encoder"
            let mut fields = line.split_whitespace();
            let (Some(flags), Some(name)) = (fields.next(), fields.next()) else {
                continue;
            };
            if !flags.starts_with('V') || flags.len() != 6 {
                continue;
            }
            let family = match name.rsplit_once('_') {
                Some((_, "nvenc")) => &mut caps.nvenc,
                Some((_, "qsv")) => &mut caps.qsv,
                Some((_, "amf")) => &mut caps.amf,
                Some((_, "vaapi")) => &mut caps.vaapi,
                Some((_, "videotoolbox")) => &mut caps.videotoolbox,
                _ => continue,
            };
            family.push(name.to_string());
        }
        caps
    }

    /// Check if any hardware encoder is available.
    pub fn has_hardware_encoder(&self) -> bool {
        !(self.nvenc.is_empty()
            && self.qsv.is_empty()
            && self.amf.is_empty()
            && self.vaapi.is_empty()
            && self.videotoolbox.is_empty())
    }

    /// Check if NVENC is available.
    pub fn has_nvenc(&self) -> bool {
        !self.nvenc.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 V....D hevc_nvenc           NVIDIA NVENC hevc encoder (codec hevc)
 V..... hevc_vaapi           H.265/HEVC (VAAPI) (codec hevc)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_parse_encoder_listing() {
        let caps = EncoderCapabilities::parse(LISTING);
        assert_eq!(caps.nvenc, vec!["h264_nvenc", "hevc_nvenc"]);
        assert_eq!(caps.vaapi, vec!["hevc_vaapi"]);
        assert!(caps.qsv.is_empty());
        assert!(caps.has_nvenc());
        assert!(caps.has_hardware_encoder());
    }

    #[test]
    fn test_default_capabilities() {
        let caps = EncoderCapabilities::default();
        assert!(!caps.has_nvenc());
        assert!(!caps.has_hardware_encoder());
    }

    #[test]
    fn test_parse_version() {
        let out = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\nbuilt with gcc";
        assert_eq!(parse_version(out).as_deref(), Some("6.1.1-3ubuntu5"));
        assert_eq!(parse_version("garbage"), None);
        assert_eq!(parse_version(""), None);
    }

    #[tokio::test]
    async fn test_check_missing_encoder() {
        let status = EncoderStatus::check(Path::new("/nonexistent/ffmpeg")).await;
        assert!(!status.installed);
        assert!(status.version.is_none());
        assert!(status.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_detect_missing_encoder() {
        let caps = EncoderCapabilities::detect(Path::new("/nonexistent/ffmpeg")).await;
        assert_eq!(caps, EncoderCapabilities::default());
    }
}
