//! Encoding supervisor lifecycle integration tests.
//!
//! These tests drive real subprocesses (shell scripts standing in for ffmpeg):
//! - Progress, log and completion events of a successful job
//! - Exactly one error event and full cleanup on failure
//! - Cancelling one of several concurrent jobs, and cancelling all
//! - Two-pass sequencing and statistics file cleanup
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use encodeall_core::encoder::{
    pass_log_prefix, EncoderConfig, EncoderError, EncodingEvent, EncodingRequest,
    EncodingSupervisor, EventStream, JobOutcome, RateControl, Stage,
};
use encodeall_core::testing::{fixtures, MockInhibitor, RecordingIndicator};

/// Test helper owning a supervisor with mock OS boundaries.
struct TestHarness {
    supervisor: EncodingSupervisor,
    inhibitor: Arc<MockInhibitor>,
    indicator: Arc<RecordingIndicator>,
    dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(EncoderConfig::default())
    }

    fn with_config(config: EncoderConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let inhibitor = Arc::new(MockInhibitor::new());
        let indicator = Arc::new(RecordingIndicator::new());
        let supervisor = EncodingSupervisor::new(config)
            .with_inhibitor(inhibitor.clone())
            .with_indicator(indicator.clone());
        Self {
            supervisor,
            inhibitor,
            indicator,
            dir,
        }
    }

    /// Writes a fake encoder into its own subdirectory.
    fn encoder(&self, name: &str, body: &str) -> PathBuf {
        let dir = self.dir.path().join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create encoder dir");
        fixtures::write_fake_encoder(&dir, body).expect("Failed to write fake encoder")
    }

    fn request(&self, job_id: &str, output: &str, encoder: &Path) -> EncodingRequest {
        let mut request = fixtures::request(self.dir.path(), encoder);
        request.output_path = self.dir.path().join(output);
        request.job_id = Some(job_id.to_string());
        request
    }

    async fn wait_for_pid(&self, job_id: &str) {
        for _ in 0..250 {
            if let Some(job) = self.supervisor.job(job_id).await {
                if job.pid.is_some() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} never started its encoder", job_id);
    }
}

/// Everything already sent on the bus.
fn drain(rx: &mut EventStream) -> Vec<EncodingEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn log_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

async fn wait_for_log(path: &Path, needle: &str) {
    for _ in 0..250 {
        if std::fs::read_to_string(path).is_ok_and(|log| log.contains(needle)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never logged {:?}", path.display(), needle);
}

fn percents(events: &[EncodingEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            EncodingEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_successful_job_reports_progress_and_completes() {
    let harness = TestHarness::new();
    let encoder = harness.encoder("ok", fixtures::PROGRESS_SCRIPT);
    let request = harness.request("job-ok", "out.mkv", &encoder);
    let output_path = request.output_path.clone();
    let mut rx = harness.supervisor.subscribe();

    let ticket = harness.supervisor.start_encoding(request).await.unwrap();
    assert_eq!(ticket.job_id, "job-ok");
    assert!(ticket.advisories.is_empty());

    let outcome = ticket.wait().await;
    assert_eq!(
        outcome,
        JobOutcome::Completed {
            output_path: output_path.clone()
        }
    );

    let events = drain(&mut rx);
    assert!(events.iter().all(|e| e.job_id() == "job-ok"));
    assert!(events.iter().any(|e| e.kind() == "log"));

    let progress = percents(&events);
    assert_eq!(progress.last().copied(), Some(100));
    assert!(progress.windows(2).all(|w| w[0] < w[1]));

    let last = events.last().unwrap();
    assert_eq!(
        last,
        &EncodingEvent::Complete {
            job_id: "job-ok".to_string(),
            output_path,
        }
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let log = std::fs::read_to_string(harness.dir.path().join("out.mkv.log")).unwrap();
    assert!(log.contains("Duration: 00:00:10.00"));
    assert!(log.contains("time=00:00:10.00"));

    assert_eq!(harness.supervisor.active_job_count().await, 0);
    assert_eq!(harness.supervisor.inhibition_count().await, 0);
    assert_eq!(harness.inhibitor.acquire_calls(), 1);
    assert_eq!(harness.inhibitor.release_calls(), 1);
    assert_eq!(harness.indicator.values().last().copied(), Some(1.0));
    assert_eq!(harness.indicator.clear_calls(), 1);
    assert!(!harness.indicator.errored());
}

#[tokio::test]
async fn test_failed_job_emits_exactly_one_error() {
    let harness = TestHarness::new();
    let encoder = harness.encoder("fail", fixtures::FAILING_SCRIPT);
    let mut rx = harness.supervisor.subscribe();

    let ticket = harness
        .supervisor
        .start_encoding(harness.request("job-fail", "out.mkv", &encoder))
        .await
        .unwrap();
    let outcome = ticket.wait().await;

    match &outcome {
        JobOutcome::Failed { message } => assert!(message.contains("code 1")),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let events = drain(&mut rx);
    let errors: Vec<_> = events.iter().filter(|e| e.kind() == "error").collect();
    assert_eq!(errors.len(), 1);
    match errors[0] {
        EncodingEvent::Error { job_id, message } => {
            assert_eq!(job_id, "job-fail");
            assert!(message.contains('1'));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(!events.iter().any(|e| e.kind() == "complete"));

    let log = std::fs::read_to_string(harness.dir.path().join("out.mkv.log")).unwrap();
    assert!(log.contains("No such file or directory"));

    assert!(!harness.supervisor.is_active("job-fail").await);
    assert_eq!(harness.supervisor.inhibition_count().await, 0);
    assert_eq!(harness.inhibitor.release_calls(), 1);
    assert!(harness.indicator.errored());
}

#[tokio::test]
async fn test_missing_encoder_fails_without_running() {
    let harness = TestHarness::new();
    let mut rx = harness.supervisor.subscribe();

    let ticket = harness
        .supervisor
        .start_encoding(harness.request(
            "job-missing",
            "out.mkv",
            Path::new("/nonexistent/bin/ffmpeg"),
        ))
        .await
        .unwrap();
    assert!(matches!(ticket.wait().await, JobOutcome::Failed { .. }));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), "error");
    assert_eq!(harness.supervisor.inhibition_count().await, 0);
}

#[tokio::test]
async fn test_cancel_unknown_job_is_noop() {
    let harness = TestHarness::new();
    let mut rx = harness.supervisor.subscribe();

    assert_eq!(harness.supervisor.cancel_encoding(Some("nope")).await, 0);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(harness.inhibitor.release_calls(), 0);
}

#[tokio::test]
async fn test_cancel_one_of_two_concurrent_jobs() {
    let harness = TestHarness::new();
    let encoder = harness.encoder("tick", fixtures::TICKING_SCRIPT);
    let mut rx = harness.supervisor.subscribe();
    let log_a = harness.dir.path().join("a.mkv.log");
    let log_b = harness.dir.path().join("b.mkv.log");

    let ticket_a = harness
        .supervisor
        .start_encoding(harness.request("job-a", "a.mkv", &encoder))
        .await
        .unwrap();
    let ticket_b = harness
        .supervisor
        .start_encoding(harness.request("job-b", "b.mkv", &encoder))
        .await
        .unwrap();
    harness.wait_for_pid("job-a").await;
    harness.wait_for_pid("job-b").await;
    wait_for_log(&log_a, "tick").await;
    wait_for_log(&log_b, "tick").await;
    assert_eq!(harness.supervisor.inhibition_count().await, 2);
    assert_eq!(harness.inhibitor.acquire_calls(), 1);

    assert_eq!(harness.supervisor.cancel_encoding(Some("job-a")).await, 1);
    let outcome_a = tokio::time::timeout(Duration::from_secs(5), ticket_a.wait())
        .await
        .expect("cancelled job should end promptly");
    assert_eq!(outcome_a, JobOutcome::Cancelled);

    let jobs = harness.supervisor.active_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, "job-b");
    assert_eq!(jobs[0].stage, Stage::SinglePass);
    assert!(jobs[0].pid.is_some());
    assert_eq!(harness.supervisor.inhibition_count().await, 1);
    assert!(harness.inhibitor.is_held());

    // The survivor keeps logging; the cancelled job's log is frozen.
    let a_len = log_len(&log_a);
    let b_len = log_len(&log_b);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(log_len(&log_a), a_len);
    assert!(log_len(&log_b) > b_len, "job-b stopped logging after job-a was cancelled");

    let after_cancel = drain(&mut rx);
    assert!(after_cancel.iter().any(|e| e.job_id() == "job-b" && e.kind() == "log"));

    // Cancelling twice changes nothing.
    assert_eq!(harness.supervisor.cancel_encoding(Some("job-a")).await, 0);

    assert_eq!(harness.supervisor.cancel_encoding(Some("job-b")).await, 1);
    assert_eq!(ticket_b.wait().await, JobOutcome::Cancelled);
    assert_eq!(harness.supervisor.inhibition_count().await, 0);
    assert_eq!(harness.inhibitor.release_calls(), 1);

    let events = drain(&mut rx);
    assert!(!after_cancel.iter().chain(&events).any(|e| e.is_terminal()));
}

#[tokio::test]
async fn test_cancel_all() {
    let harness = TestHarness::new();
    let encoder = harness.encoder("hang", fixtures::HANGING_SCRIPT);

    let tickets = vec![
        harness
            .supervisor
            .start_encoding(harness.request("job-1", "1.mkv", &encoder))
            .await
            .unwrap(),
        harness
            .supervisor
            .start_encoding(harness.request("job-2", "2.mkv", &encoder))
            .await
            .unwrap(),
    ];
    harness.wait_for_pid("job-1").await;
    harness.wait_for_pid("job-2").await;

    assert_eq!(harness.supervisor.cancel_encoding(None).await, 2);
    for ticket in tickets {
        assert_eq!(ticket.wait().await, JobOutcome::Cancelled);
    }
    assert_eq!(harness.supervisor.active_job_count().await, 0);
    assert_eq!(harness.supervisor.inhibition_count().await, 0);
    assert_eq!(harness.indicator.clear_calls(), 1);
}

#[tokio::test]
async fn test_duplicate_job_id_rejected() {
    let harness = TestHarness::new();
    let encoder = harness.encoder("hang", fixtures::HANGING_SCRIPT);

    let ticket = harness
        .supervisor
        .start_encoding(harness.request("job-dup", "dup.mkv", &encoder))
        .await
        .unwrap();
    let second = harness
        .supervisor
        .start_encoding(harness.request("job-dup", "other.mkv", &encoder))
        .await;
    assert!(matches!(second, Err(EncoderError::JobExists { .. })));
    assert_eq!(harness.supervisor.inhibition_count().await, 1);

    harness.supervisor.cancel_encoding(Some("job-dup")).await;
    assert_eq!(ticket.wait().await, JobOutcome::Cancelled);
}

#[tokio::test]
async fn test_two_pass_runs_both_passes_and_removes_stats() {
    let harness = TestHarness::new();
    let encoder = harness.encoder("two-pass", fixtures::PROGRESS_SCRIPT);
    let mut request = harness.request("job-2pass", "out.mkv", &encoder);
    request.two_pass = true;
    request.rate_control = RateControl::Bitrate { kbps: 2500 };
    let prefix = pass_log_prefix(&request.output_path);
    let mut rx = harness.supervisor.subscribe();

    let ticket = harness.supervisor.start_encoding(request).await.unwrap();
    assert!(ticket.advisories.is_empty());
    assert!(ticket.wait().await.is_completed());

    let calls = fixtures::recorded_calls(&encoder);
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("-pass 1"));
    assert!(calls[0].contains("-an"));
    assert!(calls[0].ends_with("-f null /dev/null"));
    assert!(calls[1].contains("-pass 2"));
    assert!(calls[1].ends_with("out.mkv"));

    let progress = percents(&drain(&mut rx));
    assert!(progress.contains(&50));
    assert_eq!(progress.last().copied(), Some(100));

    let stats = PathBuf::from(format!("{}-0.log", prefix.display()));
    assert!(!stats.exists());
}

#[tokio::test]
async fn test_two_pass_keeps_stats_when_configured() {
    let harness = TestHarness::with_config(EncoderConfig::default().with_keep_pass_logs(true));
    let encoder = harness.encoder("keep", fixtures::PROGRESS_SCRIPT);
    let mut request = harness.request("job-keep", "out.mkv", &encoder);
    request.two_pass = true;
    request.rate_control = RateControl::Bitrate { kbps: 2500 };
    let prefix = pass_log_prefix(&request.output_path);

    let ticket = harness.supervisor.start_encoding(request).await.unwrap();
    assert!(ticket.wait().await.is_completed());

    assert!(PathBuf::from(format!("{}-0.log", prefix.display())).exists());
    assert!(PathBuf::from(format!("{}-0.log.mbtree", prefix.display())).exists());
}

#[tokio::test]
async fn test_log_goes_to_timestamped_folder() {
    let harness = TestHarness::new();
    let encoder = harness.encoder("ts", fixtures::PROGRESS_SCRIPT);
    let mut request = harness.request("job-ts", "out.mkv", &encoder);
    request.job_timestamp = Some("1700000000".to_string());

    let ticket = harness.supervisor.start_encoding(request).await.unwrap();
    assert!(ticket.wait().await.is_completed());

    let log_path = harness
        .dir
        .path()
        .join("logs_1700000000")
        .join("out.mkv.log");
    assert!(log_path.exists());
}

#[tokio::test]
async fn test_generated_job_id() {
    let harness = TestHarness::new();
    let encoder = harness.encoder("gen", fixtures::PROGRESS_SCRIPT);
    let mut request = harness.request("unused", "out.mkv", &encoder);
    request.job_id = None;
    request.job_timestamp = Some("42".to_string());

    let ticket = harness.supervisor.start_encoding(request).await.unwrap();
    assert!(ticket.job_id.starts_with("job-"));
    assert_eq!(ticket.job_id.len(), 20);
    assert!(ticket.wait().await.is_completed());
}
