//! Incremental parser for ffmpeg's diagnostic output.
//!
//! ffmpeg reports the input length once (`Duration: 00:01:02.45`) and then keeps
//! rewriting a stats line containing `time=00:00:31.20`. Chunks read from the pipe
//! can split those patterns anywhere, so the parser scans the unconsumed tail of
//! the previous chunk together with the new one.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2}\.\d{2})").expect("valid regex"));

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d{2}):(\d{2}):(\d{2}\.\d{2})").expect("valid regex"));

/// Unmatched bytes kept between chunks; longer than any pattern.
const CARRY_LIMIT: usize = 64;

/// Tracks duration and position across chunks of one encoder run.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    carry: String,
    duration_secs: Option<f64>,
    position_secs: Option<f64>,
    last_fraction: f64,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with a duration already known, e.g. from an earlier pass.
    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            duration_secs: (duration_secs > 0.0).then_some(duration_secs),
            ..Self::default()
        }
    }

    /// Total media duration in seconds, once seen.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Latest encoded position in seconds.
    pub fn position_secs(&self) -> Option<f64> {
        self.position_secs
    }

    /// Current progress in `[0, 1]`; `None` until a positive duration is known.
    pub fn fraction(&self) -> Option<f64> {
        self.duration_secs.map(|_| self.last_fraction)
    }

    /// Feeds a chunk and returns the new progress fraction when the chunk
    /// moved the position forward and the duration is known.
    pub fn feed(&mut self, chunk: &str) -> Option<f64> {
        let mut window = std::mem::take(&mut self.carry);
        window.push_str(chunk);

        let mut consumed = 0;
        if self.duration_secs.is_none() {
            if let Some(caps) = DURATION_RE.captures(&window) {
                let secs = timestamp_secs(&caps);
                if secs > 0.0 {
                    self.duration_secs = Some(secs);
                }
                consumed = caps.get(0).map_or(0, |m| m.end());
            }
        }

        let mut latest = None;
        for caps in TIME_RE.captures_iter(&window) {
            latest = Some(timestamp_secs(&caps));
            consumed = consumed.max(caps.get(0).map_or(0, |m| m.end()));
        }

        self.carry = tail(&window[consumed..], CARRY_LIMIT).to_string();

        let position = latest?;
        self.position_secs = Some(position);
        let duration = self.duration_secs?;
        let fraction = (position / duration).min(1.0).max(self.last_fraction);
        self.last_fraction = fraction;
        Some(fraction)
    }
}

/// Converts a fraction in `[0, 1]` to a whole percentage.
pub fn to_percent(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn timestamp_secs(caps: &Captures<'_>) -> f64 {
    let field = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    field(1) * 3600.0 + field(2) * 60.0 + field(3)
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
