//! Job registry: starts, tracks and cancels encoding jobs.
//!
//! Each job runs as one tokio task driving its passes in order. The job map is
//! the single source of truth for what is running: whoever removes a job's
//! entry performs its cleanup (close log, release sleep inhibition), so every
//! exit path cleans up exactly once. Lock order is jobs → inhibition.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::args::{Advisory, EncodingPlan};
use super::config::EncoderConfig;
use super::error::EncoderError;
use super::events::{EncodingEvent, EventBus, EventStream, JobEvents};
use super::log_file::{resolve_log_path, JobLog};
use super::log_parser::{to_percent, ProgressParser};
use super::power::{NoopInhibitor, SleepInhibition};
use super::process::{EncoderProcess, KillSwitch};
use super::traits::{NoopIndicator, OutputObserver, ProgressIndicator, SleepInhibitor};
use super::types::{EncodingRequest, JobOutcome};

/// Where a job is in its pass sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SinglePass,
    FirstPass,
    SecondPass,
    Done,
}

impl Stage {
    fn initial(two_pass: bool) -> Self {
        if two_pass {
            Self::FirstPass
        } else {
            Self::SinglePass
        }
    }

    fn next(self) -> Self {
        match self {
            Self::FirstPass => Self::SecondPass,
            _ => Self::Done,
        }
    }

    /// Index into [`EncodingPlan::passes`], `None` once done.
    fn pass_index(self) -> Option<usize> {
        match self {
            Self::SinglePass | Self::FirstPass => Some(0),
            Self::SecondPass => Some(1),
            Self::Done => None,
        }
    }

    /// Share of overall job progress covered by this stage, as fractions.
    fn progress_range(self) -> (f64, f64) {
        match self {
            Self::SinglePass => (0.0, 1.0),
            Self::FirstPass => (0.0, 0.5),
            Self::SecondPass => (0.5, 1.0),
            Self::Done => (1.0, 1.0),
        }
    }
}

/// Snapshot of a registered job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub output_path: PathBuf,
    pub stage: Stage,
    pub percent: u8,
    pub duration_secs: Option<f64>,
    pub pid: Option<u32>,
}

struct JobEntry {
    output_path: PathBuf,
    log: JobLog,
    stage: Stage,
    percent: u8,
    duration_secs: Option<f64>,
    kill: Option<KillSwitch>,
    pid: Option<u32>,
}

impl JobEntry {
    fn summary(&self, job_id: &str) -> JobSummary {
        JobSummary {
            job_id: job_id.to_string(),
            output_path: self.output_path.clone(),
            stage: self.stage,
            percent: self.percent,
            duration_secs: self.duration_secs,
            pid: self.pid,
        }
    }
}

/// Handle to a started job.
#[derive(Debug)]
pub struct JobTicket {
    pub job_id: String,
    pub advisories: Vec<Advisory>,
    handle: JoinHandle<JobOutcome>,
}

impl JobTicket {
    /// Waits for the job to reach a terminal state.
    pub async fn wait(self) -> JobOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed {
                message: format!("Job task failed: {}", e),
            },
        }
    }
}

/// Deterministic id for a job without a caller-supplied one.
pub fn generate_job_id(input_path: &Path, output_path: &Path, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input_path.to_string_lossy().as_bytes());
    hasher.update(b"|");
    hasher.update(output_path.to_string_lossy().as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.as_bytes());
    let digest = hasher.finalize();
    let hash: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("job-{}", hash)
}

/// Runs encoding jobs and publishes their events.
#[derive(Clone)]
pub struct EncodingSupervisor {
    config: EncoderConfig,
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
    inhibition: Arc<SleepInhibition>,
    indicator: Arc<dyn ProgressIndicator>,
    events: EventBus,
}

impl EncodingSupervisor {
    /// Creates a supervisor without sleep inhibition or a progress indicator.
    pub fn new(config: EncoderConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            inhibition: Arc::new(SleepInhibition::new(Arc::new(NoopInhibitor::default()))),
            indicator: Arc::new(NoopIndicator),
            events,
        }
    }

    pub fn with_inhibitor(mut self, inhibitor: Arc<dyn SleepInhibitor>) -> Self {
        self.inhibition = Arc::new(SleepInhibition::new(inhibitor));
        self
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn ProgressIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn subscribe_job(&self, job_id: impl Into<String>) -> JobEvents {
        self.events.subscribe_job(job_id)
    }

    /// Accepts a request and starts running it in the background.
    ///
    /// Fails without spawning anything if the id is taken or the log file
    /// cannot be opened; the latter also emits an `error` event.
    pub async fn start_encoding(&self, request: EncodingRequest) -> Result<JobTicket, EncoderError> {
        request.validate()?;
        let job_id = match &request.job_id {
            Some(id) if id.trim().is_empty() => {
                return Err(EncoderError::invalid_request("job id must not be empty"))
            }
            Some(id) => id.clone(),
            None => {
                let timestamp = request
                    .job_timestamp
                    .clone()
                    .unwrap_or_else(|| Utc::now().timestamp_millis().to_string());
                generate_job_id(&request.input_path, &request.output_path, &timestamp)
            }
        };

        let plan = EncodingPlan::build(&request);
        for advisory in &plan.advisories {
            warn!(job_id = %job_id, "{}", advisory.message());
        }

        let log_directory = request
            .log_directory
            .as_deref()
            .or(self.config.log_directory.as_deref());
        let log_path = resolve_log_path(
            &request.output_path,
            log_directory,
            request.job_timestamp.as_deref(),
        );
        let executable = request
            .encoder_path
            .clone()
            .unwrap_or_else(|| self.config.ffmpeg_path.clone());

        let log = {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&job_id) {
                return Err(EncoderError::JobExists { job_id });
            }

            let log = match JobLog::open(&log_path).await {
                Ok(log) => log,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Could not open job log");
                    self.events.emit(EncodingEvent::Error {
                        job_id: job_id.clone(),
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            };

            jobs.insert(
                job_id.clone(),
                JobEntry {
                    output_path: request.output_path.clone(),
                    log: log.clone(),
                    stage: Stage::initial(plan.is_two_pass()),
                    percent: 0,
                    duration_secs: None,
                    kill: None,
                    pid: None,
                },
            );
            self.inhibition.acquire().await;
            log
        };

        info!(
            job_id = %job_id,
            input = %request.input_path.display(),
            output = %request.output_path.display(),
            passes = plan.passes.len(),
            log = %log.path().display(),
            "Encoding job started"
        );

        let advisories = plan.advisories.clone();
        let context = JobContext {
            supervisor: self.clone(),
            job_id: job_id.clone(),
            executable,
            output_path: request.output_path,
            plan,
            log,
        };
        let handle = tokio::spawn(context.run());

        Ok(JobTicket {
            job_id,
            advisories,
            handle,
        })
    }

    /// Cancels one job, or every job when `job_id` is `None`.
    ///
    /// Returns how many jobs were cancelled. Unknown ids are ignored and no
    /// events are emitted.
    pub async fn cancel_encoding(&self, job_id: Option<&str>) -> usize {
        let (removed, remaining) = {
            let mut jobs = self.jobs.write().await;
            let ids: Vec<String> = match job_id {
                Some(id) if jobs.contains_key(id) => vec![id.to_string()],
                Some(_) => Vec::new(),
                None => jobs.keys().cloned().collect(),
            };

            // Kill and close before the id becomes free for reuse.
            for id in &ids {
                if let Some(kill) = jobs.get(id).and_then(|entry| entry.kill.as_ref()) {
                    kill.trigger();
                }
            }
            join_all(
                ids.iter()
                    .filter_map(|id| jobs.get(id))
                    .map(|entry| entry.log.close()),
            )
            .await;
            for id in &ids {
                jobs.remove(id);
            }
            (ids, jobs.len())
        };

        if removed.is_empty() {
            debug!(job_id = ?job_id, "Nothing to cancel");
            return 0;
        }

        for id in &removed {
            info!(job_id = %id, "Encoding job cancelled");
            self.inhibition.release().await;
        }
        if remaining == 0 {
            self.indicator.clear().await;
        }

        removed.len()
    }

    /// Snapshots of every registered job, ordered by id.
    pub async fn active_jobs(&self) -> Vec<JobSummary> {
        let jobs = self.jobs.read().await;
        let mut summaries: Vec<JobSummary> = jobs
            .iter()
            .map(|(id, entry)| entry.summary(id))
            .collect();
        summaries.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        summaries
    }

    pub async fn job(&self, job_id: &str) -> Option<JobSummary> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|entry| entry.summary(job_id))
    }

    pub async fn active_job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_active(&self, job_id: &str) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    /// Number of jobs currently counted by sleep inhibition.
    pub async fn inhibition_count(&self) -> usize {
        self.inhibition.count().await
    }
}

/// Everything one job task needs.
struct JobContext {
    supervisor: EncodingSupervisor,
    job_id: String,
    executable: PathBuf,
    output_path: PathBuf,
    plan: EncodingPlan,
    log: JobLog,
}

impl JobContext {
    async fn run(self) -> JobOutcome {
        let result = self.run_stages().await;
        self.finish(result).await
    }

    async fn run_stages(&self) -> Result<(), EncoderError> {
        let mut stage = Stage::initial(self.plan.is_two_pass());
        let mut duration: Option<f64> = None;

        while let Some(index) = stage.pass_index() {
            let args = self.plan.passes.get(index).ok_or_else(|| {
                EncoderError::invalid_request(format!("missing arguments for {:?}", stage))
            })?;
            self.enter_stage(stage).await?;

            debug!(job_id = %self.job_id, stage = ?stage, args = ?args, "Starting encoder pass");
            let process = EncoderProcess::spawn(&self.executable, args)?;
            // Dropping the process kills it if the job was cancelled meanwhile.
            self.attach(&process).await?;

            let mut parser = duration
                .map(ProgressParser::with_duration)
                .unwrap_or_default();
            let mut observer = PassObserver {
                context: self,
                range: stage.progress_range(),
                last_percent: None,
            };
            let result = process.supervise(&mut parser, &mut observer).await;

            duration = parser.duration_secs().or(duration);
            self.detach(duration).await;
            result?;

            stage = stage.next();
        }

        self.enter_stage(Stage::Done).await
    }

    async fn enter_stage(&self, stage: Stage) -> Result<(), EncoderError> {
        let mut jobs = self.supervisor.jobs.write().await;
        let entry = jobs.get_mut(&self.job_id).ok_or(EncoderError::Cancelled)?;
        entry.stage = stage;
        entry.percent = to_percent(stage.progress_range().0);
        Ok(())
    }

    async fn attach(&self, process: &EncoderProcess) -> Result<(), EncoderError> {
        let mut jobs = self.supervisor.jobs.write().await;
        let entry = jobs.get_mut(&self.job_id).ok_or(EncoderError::Cancelled)?;
        entry.kill = Some(process.kill_switch());
        entry.pid = process.pid();
        Ok(())
    }

    async fn detach(&self, duration: Option<f64>) {
        let mut jobs = self.supervisor.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&self.job_id) {
            entry.kill = None;
            entry.pid = None;
            entry.duration_secs = duration;
        }
    }

    /// Records a new overall percentage. `false` if the job is gone.
    async fn record_percent(&self, percent: u8) -> bool {
        let mut jobs = self.supervisor.jobs.write().await;
        match jobs.get_mut(&self.job_id) {
            Some(entry) => {
                entry.percent = percent;
                true
            }
            None => false,
        }
    }

    async fn finish(&self, result: Result<(), EncoderError>) -> JobOutcome {
        let (registered, remaining) = {
            let mut jobs = self.supervisor.jobs.write().await;
            match jobs.get(&self.job_id).map(|entry| entry.log.clone()) {
                Some(log) => {
                    log.close().await;
                    jobs.remove(&self.job_id);
                    (true, jobs.len())
                }
                None => (false, jobs.len()),
            }
        };

        if !self.supervisor.config.keep_pass_logs {
            self.remove_pass_logs().await;
        }

        // Cancellation already cleaned up.
        if !registered {
            debug!(job_id = %self.job_id, "Job task ended after cancellation");
            return JobOutcome::Cancelled;
        }

        self.supervisor.inhibition.release().await;
        let indicator = &self.supervisor.indicator;

        match result {
            Ok(()) => {
                if remaining == 0 {
                    indicator.clear().await;
                }
                info!(job_id = %self.job_id, output = %self.output_path.display(), "Encoding job completed");
                self.supervisor.events.emit(EncodingEvent::Complete {
                    job_id: self.job_id.clone(),
                    output_path: self.output_path.clone(),
                });
                JobOutcome::Completed {
                    output_path: self.output_path.clone(),
                }
            }
            Err(EncoderError::Cancelled) => {
                if remaining == 0 {
                    indicator.clear().await;
                }
                JobOutcome::Cancelled
            }
            Err(e) => {
                indicator.set_error().await;
                let message = e.to_string();
                warn!(job_id = %self.job_id, error = %message, "Encoding job failed");
                self.supervisor.events.emit(EncodingEvent::Error {
                    job_id: self.job_id.clone(),
                    message: message.clone(),
                });
                JobOutcome::Failed { message }
            }
        }
    }

    async fn remove_pass_logs(&self) {
        for path in self.plan.pass_log_files() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed pass log"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove pass log"),
            }
        }
    }
}

/// Routes one pass's output to the log, the event bus and the indicator.
struct PassObserver<'a> {
    context: &'a JobContext,
    range: (f64, f64),
    last_percent: Option<u8>,
}

#[async_trait]
impl OutputObserver for PassObserver<'_> {
    async fn on_output(&mut self, chunk: &str) {
        let context = self.context;
        if !context.supervisor.is_active(&context.job_id).await {
            return;
        }
        context.log.write(chunk).await;
        context.supervisor.events.emit(EncodingEvent::Log {
            job_id: context.job_id.clone(),
            text: chunk.to_string(),
        });
    }

    async fn on_progress(&mut self, fraction: f64) {
        let (start, end) = self.range;
        let overall = start + (end - start) * fraction;
        let percent = to_percent(overall);
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);

        let context = self.context;
        if !context.record_percent(percent).await {
            return;
        }
        context.supervisor.indicator.set(overall).await;
        context.supervisor.events.emit(EncodingEvent::Progress {
            job_id: context.job_id.clone(),
            percent,
        });
    }
}
