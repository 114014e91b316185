//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the encode-all server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Job outcome counters, fed from the supervisor's event bus
//! - Active jobs and sleep inhibition (collected dynamically)

use encodeall_core::encoder::EventStream;
use encodeall_core::EncodingEvent;
use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "encodeall_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["method", "path", "status"],
    )
    .expect("valid metric")
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("encodeall_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("valid metric")
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "encodeall_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .expect("valid metric")
});

/// WebSocket messages sent by event type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("encodeall_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .expect("valid metric")
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "encodeall_ws_lag_events_total",
        "Events skipped because a WebSocket client fell behind",
    )
    .expect("valid metric")
});

// =============================================================================
// Job Metrics
// =============================================================================

pub static JOBS_STARTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("encodeall_jobs_started_total", "Encoding jobs accepted")
        .expect("valid metric")
});

pub static JOBS_COMPLETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("encodeall_jobs_completed_total", "Encoding jobs completed")
        .expect("valid metric")
});

pub static JOBS_FAILED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("encodeall_jobs_failed_total", "Encoding jobs failed")
        .expect("valid metric")
});

pub static JOBS_CANCELLED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("encodeall_jobs_cancelled_total", "Encoding jobs cancelled")
        .expect("valid metric")
});

/// Registered jobs (collected dynamically).
pub static JOBS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("encodeall_jobs_active", "Currently registered encoding jobs")
        .expect("valid metric")
});

/// Jobs holding sleep inhibition (collected dynamically).
pub static SLEEP_INHIBITION_HOLDERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "encodeall_sleep_inhibition_holders",
        "Jobs currently holding system sleep inhibition",
    )
    .expect("valid metric")
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(WS_CONNECTIONS_ACTIVE.clone()),
        Box::new(WS_MESSAGES_SENT.clone()),
        Box::new(WS_LAG_EVENTS.clone()),
        Box::new(JOBS_STARTED_TOTAL.clone()),
        Box::new(JOBS_COMPLETED_TOTAL.clone()),
        Box::new(JOBS_FAILED_TOTAL.clone()),
        Box::new(JOBS_CANCELLED_TOTAL.clone()),
        Box::new(JOBS_ACTIVE.clone()),
        Box::new(SLEEP_INHIBITION_HOLDERS.clone()),
    ];
    for metric in metrics {
        if let Err(e) = registry.register(metric) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let supervisor = state.supervisor();
    JOBS_ACTIVE.set(supervisor.active_job_count().await as i64);
    SLEEP_INHIBITION_HOLDERS.set(supervisor.inhibition_count().await as i64);
}

/// Counts terminal job events until the bus closes.
///
/// Terminal events survive subscriber lag, so the counts stay exact.
pub fn spawn_event_metrics(mut events: EventStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EncodingEvent::Complete { .. } => JOBS_COMPLETED_TOTAL.inc(),
                EncodingEvent::Error { .. } => JOBS_FAILED_TOTAL.inc(),
                _ => {}
            }
        }
        debug!("Event bus closed, metrics listener stopping");
    })
}

static JOB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/jobs/[^/]+$").expect("valid regex"));

/// Normalize a path for metric labels (replace job ids with a placeholder).
pub fn normalize_path(path: &str) -> String {
    if path.ends_with("/jobs/preview") {
        return path.to_string();
    }
    JOB_ID_RE.replace(path, "/jobs/{id}").into_owned()
}
