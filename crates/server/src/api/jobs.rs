//! Encoding job API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use encodeall_core::encoder::{Advisory, EncodingPlan, JobSummary};
use encodeall_core::{EncoderError, EncodingRequest};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::metrics::{JOBS_CANCELLED_TOTAL, JOBS_STARTED_TOTAL};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// An advisory with its human-readable explanation.
#[derive(Debug, Serialize)]
pub struct AdvisoryResponse {
    pub code: Advisory,
    pub message: &'static str,
}

impl From<Advisory> for AdvisoryResponse {
    fn from(advisory: Advisory) -> Self {
        Self {
            code: advisory,
            message: advisory.message(),
        }
    }
}

fn advisories(list: &[Advisory]) -> Vec<AdvisoryResponse> {
    list.iter().copied().map(AdvisoryResponse::from).collect()
}

/// Response for an accepted job
#[derive(Debug, Serialize)]
pub struct JobCreatedResponse {
    pub job_id: String,
    pub advisories: Vec<AdvisoryResponse>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub total: usize,
}

/// What a request would run, without running it
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub passes: Vec<Vec<String>>,
    pub command_lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_log_prefix: Option<PathBuf>,
    pub advisories: Vec<AdvisoryResponse>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

type ErrorReply = (StatusCode, Json<JobErrorResponse>);

fn error_reply(status: StatusCode, error: impl ToString) -> ErrorReply {
    (
        status,
        Json(JobErrorResponse {
            error: error.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Start an encoding job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EncodingRequest>,
) -> Result<(StatusCode, Json<JobCreatedResponse>), ErrorReply> {
    match state.supervisor().start_encoding(request).await {
        Ok(ticket) => {
            JOBS_STARTED_TOTAL.inc();
            Ok((
                StatusCode::ACCEPTED,
                Json(JobCreatedResponse {
                    advisories: advisories(&ticket.advisories),
                    job_id: ticket.job_id,
                }),
            ))
        }
        Err(e @ EncoderError::JobExists { .. }) => Err(error_reply(StatusCode::CONFLICT, e)),
        Err(e @ EncoderError::InvalidRequest { .. }) => {
            Err(error_reply(StatusCode::BAD_REQUEST, e))
        }
        Err(e @ EncoderError::LogFile { .. }) => {
            // Accepted, then failed before spawning; its `error` event counts as a failed job.
            JOBS_STARTED_TOTAL.inc();
            Err(error_reply(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
        Err(e) => Err(error_reply(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// List registered jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobListResponse> {
    let jobs = state.supervisor().active_jobs().await;
    Json(JobListResponse {
        total: jobs.len(),
        jobs,
    })
}

/// Get a registered job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, ErrorReply> {
    state
        .supervisor()
        .job(&id)
        .await
        .map(Json)
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, format!("Job not found: {}", id)))
}

/// Cancel one job. Unknown ids are not an error.
pub async fn cancel_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    let cancelled = state.supervisor().cancel_encoding(Some(&id)).await;
    JOBS_CANCELLED_TOTAL.inc_by(cancelled as u64);
    StatusCode::NO_CONTENT
}

/// Cancel every job
pub async fn cancel_all_jobs(State(state): State<Arc<AppState>>) -> StatusCode {
    let cancelled = state.supervisor().cancel_encoding(None).await;
    JOBS_CANCELLED_TOTAL.inc_by(cancelled as u64);
    info!("Cancelled {} jobs on request", cancelled);
    StatusCode::NO_CONTENT
}

/// Show the encoder invocations a request would produce
pub async fn preview_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EncodingRequest>,
) -> Result<Json<PreviewResponse>, ErrorReply> {
    request
        .validate()
        .map_err(|e| error_reply(StatusCode::BAD_REQUEST, e))?;

    let plan = EncodingPlan::build(&request);
    let executable = request
        .encoder_path
        .as_deref()
        .unwrap_or(state.config().encoder.ffmpeg_path.as_path());

    Ok(Json(PreviewResponse {
        command_lines: plan.command_lines(executable),
        advisories: advisories(&plan.advisories),
        passes: plan.passes,
        pass_log_prefix: plan.pass_log_prefix,
    }))
}
