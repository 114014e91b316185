use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use encodeall_core::encoder::{EncoderCapabilities, EncoderStatus};
use encodeall_core::Config;
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Config> {
    Json(state.config().clone())
}

/// Encoder installation status and hardware capabilities.
#[derive(Serialize)]
pub struct EncoderResponse {
    #[serde(flatten)]
    pub status: EncoderStatus,
    pub capabilities: EncoderCapabilities,
}

/// Re-checks the configured encoder on every call; capabilities are read once at startup.
pub async fn get_encoder(State(state): State<Arc<AppState>>) -> Json<EncoderResponse> {
    let status = EncoderStatus::check(&state.config().encoder.ffmpeg_path).await;
    Json(EncoderResponse {
        status,
        capabilities: state.capabilities().clone(),
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
