//! Builds ffmpeg argument lists from an [`EncodingRequest`].

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::types::{EncodingRequest, RateControl, SubtitleMode, TrackSelection};

/// Sink ffmpeg writes the discarded first-pass output to.
#[cfg(windows)]
pub const NULL_SINK: &str = "NUL";
#[cfg(not(windows))]
pub const NULL_SINK: &str = "/dev/null";

/// Prefix of the two-pass statistics files.
const PASS_LOG_STEM: &str = "encodeall-2pass";

/// Something about the request the caller should know but that does not block it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    /// Two-pass only pays off with a bitrate target.
    TwoPassWithCrf,
}

impl Advisory {
    pub fn message(&self) -> &'static str {
        match self {
            Self::TwoPassWithCrf => {
                "Two-pass encoding is usually ineffective with CRF; use bitrate mode"
            }
        }
    }
}

/// The encoder invocations for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingPlan {
    /// One argument list per pass, in execution order.
    pub passes: Vec<Vec<String>>,
    /// Statistics file prefix shared by both passes of a two-pass job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_log_prefix: Option<PathBuf>,
    pub advisories: Vec<Advisory>,
}

impl EncodingPlan {
    /// Builds the plan for a request.
    pub fn build(request: &EncodingRequest) -> Self {
        let mut advisories = Vec::new();
        if request.two_pass && matches!(request.rate_control, RateControl::Crf { .. }) {
            advisories.push(Advisory::TwoPassWithCrf);
        }

        if request.runs_two_passes() {
            let prefix = pass_log_prefix(&request.output_path);
            Self {
                passes: vec![
                    first_pass_args(request, &prefix),
                    second_pass_args(request, &prefix),
                ],
                pass_log_prefix: Some(prefix),
                advisories,
            }
        } else {
            Self {
                passes: vec![single_pass_args(request)],
                pass_log_prefix: None,
                advisories,
            }
        }
    }

    pub fn is_two_pass(&self) -> bool {
        self.passes.len() == 2
    }

    /// Renders each pass as a shell command line, for display only.
    pub fn command_lines(&self, executable: &Path) -> Vec<String> {
        let executable = quote_arg(&executable.to_string_lossy());
        self.passes
            .iter()
            .map(|args| {
                let mut line = executable.clone();
                for arg in args {
                    line.push(' ');
                    line.push_str(&quote_arg(arg));
                }
                line
            })
            .collect()
    }

    /// Statistics files ffmpeg leaves next to the prefix after a two-pass run.
    pub fn pass_log_files(&self) -> Vec<PathBuf> {
        let Some(prefix) = &self.pass_log_prefix else {
            return Vec::new();
        };
        let base = prefix.to_string_lossy();
        vec![
            PathBuf::from(format!("{}-0.log", base)),
            PathBuf::from(format!("{}-0.log.mbtree", base)),
        ]
    }
}

/// Statistics file prefix for an output, stable across runs.
pub fn pass_log_prefix(output_path: &Path) -> PathBuf {
    let file_name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let digest = Sha256::digest(file_name.as_bytes());
    let hash: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    let name = format!("{}-{}", PASS_LOG_STEM, hash);
    match output_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

fn single_pass_args(request: &EncodingRequest) -> Vec<String> {
    let mut args = base_args(request);
    args.extend(video_args(request));
    args.extend(audio_args(request));
    args.extend(subtitle_args(request));
    args.extend(common_args(request));
    args.extend(mapping_args(request));
    args.push(path_arg(&request.output_path));
    args
}

fn first_pass_args(request: &EncodingRequest, prefix: &Path) -> Vec<String> {
    let mut args = base_args(request);
    args.extend(video_args(request));
    args.extend(["-an".to_string(), "-sn".to_string()]);
    args.extend(common_args(request));
    args.extend(pass_args(1, prefix));
    args.extend([
        "-f".to_string(),
        "null".to_string(),
        NULL_SINK.to_string(),
    ]);
    args
}

fn second_pass_args(request: &EncodingRequest, prefix: &Path) -> Vec<String> {
    let mut args = base_args(request);
    args.extend(video_args(request));
    args.extend(audio_args(request));
    args.extend(subtitle_args(request));
    args.extend(common_args(request));
    args.extend(mapping_args(request));
    args.extend(pass_args(2, prefix));
    args.push(path_arg(&request.output_path));
    args
}

fn base_args(request: &EncodingRequest) -> Vec<String> {
    vec![
        "-y".to_string(), // Overwrite output
        "-i".to_string(),
        path_arg(&request.input_path),
        "-map_metadata".to_string(),
        "0".to_string(),
    ]
}

fn video_args(request: &EncodingRequest) -> Vec<String> {
    let codec = &request.video_codec;
    let mut args = vec!["-c:v".to_string(), codec.name().to_string()];
    if codec.is_passthrough() {
        return args;
    }

    match request.rate_control {
        RateControl::Bitrate { kbps } => {
            args.extend(["-b:v".to_string(), format!("{}k", kbps)]);
        }
        RateControl::Crf { value } => {
            let flag = if codec.is_hardware_encoder() { "-cq" } else { "-crf" };
            args.extend([flag.to_string(), value.to_string()]);
        }
    }
    args.extend(["-preset".to_string(), request.preset.clone()]);
    args
}

fn audio_args(request: &EncodingRequest) -> Vec<String> {
    let mut args = vec!["-c:a".to_string(), request.audio_codec.clone()];
    if request.audio_is_passthrough() {
        return args;
    }

    if request.audio_bitrate_kbps > 0 {
        args.extend(["-b:a".to_string(), format!("{}k", request.audio_bitrate_kbps)]);
    }
    if let Some(count) = request.audio_channels.channel_count() {
        args.extend(["-ac".to_string(), count.to_string()]);
    }
    if request.volume_db != 0.0 {
        args.extend([
            "-filter:a".to_string(),
            format!("volume={}dB", request.volume_db),
        ]);
    }
    args
}

fn subtitle_args(request: &EncodingRequest) -> Vec<String> {
    match request.subtitle_mode {
        SubtitleMode::None => vec!["-sn".to_string()],
        SubtitleMode::Copy => vec!["-c:s".to_string(), "copy".to_string()],
        SubtitleMode::Auto => Vec::new(),
    }
}

fn common_args(request: &EncodingRequest) -> Vec<String> {
    if request.threads > 0 {
        vec!["-threads".to_string(), request.threads.to_string()]
    } else {
        Vec::new()
    }
}

fn mapping_args(request: &EncodingRequest) -> Vec<String> {
    let copy_subtitles = request.subtitle_mode == SubtitleMode::Copy;
    let selectors: &[&str] = match (request.track_selection, copy_subtitles) {
        (TrackSelection::All, _) => &["0"],
        (TrackSelection::AllAudio, true) => &["0:v:0", "0:a", "0:s?"],
        (TrackSelection::AllAudio, false) => &["0:v:0", "0:a"],
        // Default stream selection drops subtitles, so they are mapped
        // explicitly and the video/audio picks stay with ffmpeg.
        (TrackSelection::Auto, true) => &["0:s?"],
        (TrackSelection::Auto, false) => &[],
    };
    selectors
        .iter()
        .flat_map(|selector| ["-map".to_string(), selector.to_string()])
        .collect()
}

fn pass_args(number: u8, prefix: &Path) -> Vec<String> {
    vec![
        "-pass".to_string(),
        number.to_string(),
        "-passlogfile".to_string(),
        path_arg(prefix),
    ]
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn quote_arg(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,:/=+@%?".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
