//! Types for the encoder module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::error::EncoderError;

/// Codec value meaning "copy the stream as-is".
pub const PASSTHROUGH_CODEC: &str = "copy";

/// Marker in the names of NVENC encoders (`hevc_nvenc`, `nvenc_h264`, `nvenc`).
const NVENC_MARKER: &str = "nvenc";

/// Video codec descriptor.
///
/// The hardware flag is resolved once when the codec is chosen so argument
/// building never has to inspect the name again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VideoCodec {
    name: String,
    hardware: bool,
}

impl VideoCodec {
    /// Creates a descriptor for the given ffmpeg encoder name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        // Only NVENC takes `-cq`; other hardware families keep `-crf`.
        let hardware = name.contains(NVENC_MARKER);
        Self { name, hardware }
    }

    /// The "no re-encode" codec.
    pub fn passthrough() -> Self {
        Self::new(PASSTHROUGH_CODEC)
    }

    /// The ffmpeg encoder name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is an NVENC encoder, which takes `-cq` instead of `-crf`.
    pub fn is_hardware_encoder(&self) -> bool {
        self.hardware
    }

    /// Whether this codec copies the stream unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.name == PASSTHROUGH_CODEC
    }
}

impl From<String> for VideoCodec {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for VideoCodec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<VideoCodec> for String {
    fn from(codec: VideoCodec) -> Self {
        codec.name
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Output audio channel layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AudioChannels {
    /// Keep the source layout.
    #[default]
    Same,
    Mono,
    Stereo,
    /// 5.1 surround.
    Surround51,
    /// A value the UI sent that we do not know; emits no channel flag.
    Unrecognized(String),
}

impl AudioChannels {
    /// Channel count passed to `-ac`, if any.
    pub fn channel_count(&self) -> Option<u8> {
        match self {
            Self::Mono => Some(1),
            Self::Stereo => Some(2),
            Self::Surround51 => Some(6),
            Self::Same | Self::Unrecognized(_) => None,
        }
    }
}

impl From<String> for AudioChannels {
    fn from(value: String) -> Self {
        match value.as_str() {
            "same" => Self::Same,
            "mono" => Self::Mono,
            "stereo" => Self::Stereo,
            "5.1" => Self::Surround51,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<AudioChannels> for String {
    fn from(channels: AudioChannels) -> Self {
        match channels {
            AudioChannels::Same => "same".to_string(),
            AudioChannels::Mono => "mono".to_string(),
            AudioChannels::Stereo => "stereo".to_string(),
            AudioChannels::Surround51 => "5.1".to_string(),
            AudioChannels::Unrecognized(value) => value,
        }
    }
}

/// Video rate control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateControl {
    /// Constant quality (CRF, or CQ on hardware encoders).
    Crf { value: u32 },
    /// Target bitrate in kbps.
    Bitrate { kbps: u32 },
}

impl Default for RateControl {
    fn default() -> Self {
        Self::Crf { value: 23 }
    }
}

/// Which input streams are carried into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSelection {
    /// Let ffmpeg pick one stream per type.
    #[default]
    Auto,
    /// Every stream of every type.
    All,
    /// First video stream plus every audio stream.
    AllAudio,
}

/// Subtitle handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleMode {
    /// Leave subtitle handling to ffmpeg.
    #[default]
    Auto,
    /// Drop all subtitle streams.
    None,
    /// Copy subtitle streams without conversion.
    Copy,
}

/// A request to transcode one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingRequest {
    pub input_path: PathBuf,
    /// Output path; the container follows from its extension.
    pub output_path: PathBuf,
    #[serde(default = "default_video_codec")]
    pub video_codec: VideoCodec,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default)]
    pub audio_channels: AudioChannels,
    /// Audio bitrate in kbps, 0 leaves it to the encoder.
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,
    /// Volume adjustment in dB, 0 adds no filter.
    #[serde(default)]
    pub volume_db: f64,
    #[serde(default)]
    pub rate_control: RateControl,
    #[serde(default = "default_preset")]
    pub preset: String,
    /// Encoder threads, 0 lets ffmpeg decide.
    #[serde(default)]
    pub threads: u32,
    #[serde(default)]
    pub track_selection: TrackSelection,
    #[serde(default)]
    pub subtitle_mode: SubtitleMode,
    #[serde(default)]
    pub two_pass: bool,
    /// Encoder executable; falls back to the configured ffmpeg path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_directory: Option<PathBuf>,
    /// Batch timestamp used to group log files of one run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

fn default_video_codec() -> VideoCodec {
    VideoCodec::new("libx265")
}

fn default_audio_bitrate() -> u32 {
    128
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_preset() -> String {
    "medium".to_string()
}

impl EncodingRequest {
    /// Creates a request with the default encoding settings.
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            audio_channels: AudioChannels::Same,
            audio_bitrate_kbps: default_audio_bitrate(),
            volume_db: 0.0,
            rate_control: RateControl::default(),
            preset: default_preset(),
            threads: 0,
            track_selection: TrackSelection::Auto,
            subtitle_mode: SubtitleMode::Auto,
            two_pass: false,
            encoder_path: None,
            log_directory: None,
            job_timestamp: None,
            job_id: None,
        }
    }

    /// Whether the audio codec is the passthrough sentinel.
    pub fn audio_is_passthrough(&self) -> bool {
        self.audio_codec == PASSTHROUGH_CODEC
    }

    /// Rejects requests ffmpeg could not possibly run.
    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.input_path.as_os_str().is_empty() {
            return Err(EncoderError::invalid_request("input path is empty"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(EncoderError::invalid_request("output path is empty"));
        }
        if self.input_path == self.output_path {
            return Err(EncoderError::invalid_request(
                "output path must differ from input path",
            ));
        }
        if self.video_codec.name().is_empty() || self.audio_codec.is_empty() {
            return Err(EncoderError::invalid_request("codec must not be empty"));
        }
        Ok(())
    }

    /// Whether this request actually runs two encoder passes.
    pub fn runs_two_passes(&self) -> bool {
        self.two_pass && !self.video_codec.is_passthrough()
    }
}

/// Final outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { output_path: PathBuf },
    Failed { message: String },
    Cancelled,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
