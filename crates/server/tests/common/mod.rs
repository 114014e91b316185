//! Common test utilities for in-process API testing.
//!
//! The fixture builds the real router over a supervisor whose sleep
//! inhibitor is a mock, so no test touches the host's power management.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use encodeall_core::encoder::{EncoderCapabilities, EncodingSupervisor};
use encodeall_core::testing::MockInhibitor;
use encodeall_core::{Config, EncoderConfig};
use encodeall_server::state::AppState;

/// Re-export fixtures for test convenience
pub use encodeall_core::testing::fixtures;

/// In-process server with a mock sleep inhibitor.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() {
///     let fixture = TestFixture::new();
///     let response = fixture.get("/api/v1/health").await;
///     assert_eq!(response.status, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub supervisor: EncodingSupervisor,
    pub inhibitor: Arc<MockInhibitor>,
    /// Holds inputs, outputs and fake encoders for the test
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_capabilities(EncoderCapabilities::default())
    }

    pub fn with_capabilities(capabilities: EncoderCapabilities) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.server.port = 0;
        config.encoder = EncoderConfig::with_ffmpeg_path(temp_dir.path().join("no-ffmpeg"));

        let inhibitor = Arc::new(MockInhibitor::new());
        let supervisor = EncodingSupervisor::new(config.encoder.clone())
            .with_inhibitor(Arc::clone(&inhibitor) as _);

        let state = Arc::new(AppState::new(config, supervisor.clone(), capabilities));
        let router = encodeall_server::api::create_router(state);

        Self {
            router,
            supervisor,
            inhibitor,
            temp_dir,
        }
    }

    /// Absolute path of a file inside the fixture's temp dir.
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes a fake encoder script into its own subdirectory.
    #[cfg(unix)]
    pub fn encoder(&self, name: &str, body: &str) -> PathBuf {
        let dir = self.path(name);
        std::fs::create_dir_all(&dir).expect("Failed to create encoder dir");
        fixtures::write_fake_encoder(&dir, body).expect("Failed to write fake encoder")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
