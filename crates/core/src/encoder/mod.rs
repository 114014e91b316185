//! Encoder module: supervises ffmpeg encoding jobs.
//!
//! A job turns an [`EncodingRequest`] into one or two ffmpeg invocations
//! ([`EncodingPlan`]), runs them in order while parsing the diagnostic stream
//! for progress, and reports what happens as [`EncodingEvent`]s keyed by job id.
//!
//! # Features
//!
//! - Single-pass and two-pass encoding with hardware-aware quality flags
//! - Incremental progress parsing that tolerates arbitrary chunk boundaries
//! - Any number of concurrent jobs, each cancellable on its own
//! - Reference-counted system sleep inhibition while anything is encoding
//! - Per-job log files
//!
//! # Example
//!
//! ```ignore
//! use encodeall_core::encoder::{EncoderConfig, EncodingRequest, EncodingSupervisor};
//!
//! let supervisor = EncodingSupervisor::new(EncoderConfig::default());
//! let mut request = EncodingRequest::new("/videos/in.mp4", "/videos/out.mkv");
//! request.job_timestamp = Some("1700000000".to_string());
//!
//! let ticket = supervisor.start_encoding(request).await?;
//! let mut events = supervisor.subscribe_job(&ticket.job_id);
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! ```

mod args;
mod capabilities;
mod config;
mod error;
mod events;
mod log_file;
mod log_parser;
mod power;
mod process;
mod supervisor;
mod traits;
mod types;

pub use args::{pass_log_prefix, Advisory, EncodingPlan, NULL_SINK};
pub use capabilities::{EncoderCapabilities, EncoderStatus};
pub use config::EncoderConfig;
pub use error::EncoderError;
pub use events::{EncodingEvent, EventBus, EventStream, JobEvents};
pub use log_file::{resolve_log_path, JobLog};
pub use log_parser::{to_percent, ProgressParser};
pub use power::{CommandInhibitor, NoopInhibitor, SleepInhibition};
pub use process::{EncoderProcess, KillSwitch};
pub use supervisor::{generate_job_id, EncodingSupervisor, JobSummary, JobTicket, Stage};
pub use traits::{
    InhibitionHandle, NoopIndicator, OutputObserver, ProgressIndicator, SleepInhibitor,
};
pub use types::{
    AudioChannels, EncodingRequest, JobOutcome, RateControl, SubtitleMode, TrackSelection,
    VideoCodec, PASSTHROUGH_CODEC,
};
