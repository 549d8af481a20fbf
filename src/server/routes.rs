//! JSON handlers for the dashboard API

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::testing::Selection;

#[derive(Debug, Default, Deserialize)]
struct RunTestsRequest {
    #[serde(default)]
    tests: Selection,
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `GET /api/config`
pub async fn get_config(State(state): State<Arc<AppState>>) -> Response {
    Json(state.config.masked()).into_response()
}

/// `POST /api/run-tests`
pub async fn run_tests(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: RunTestsRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RunTestsRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed run-tests body");
                return error(StatusCode::BAD_REQUEST, "Request body must be valid JSON");
            }
        }
    };

    // One run at a time; concurrent requests queue here
    let mut runner = state.runner.lock().await;
    let run = runner.run(&request.tests).await;
    state.record(&run);
    Json(run).into_response()
}

/// `GET /api/test-results`
pub async fn test_results(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.snapshot();
    let results = &snapshot.last_results;
    if results.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No tests have been run yet" })),
        )
            .into_response();
    }
    Json(results).into_response()
}

/// `GET /api/test-history`
pub async fn test_history(State(state): State<Arc<AppState>>) -> Response {
    Json(&state.snapshot().history).into_response()
}

/// `GET /api/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let api_status = state.client.health().await;
    Json(json!({
        "status": "healthy",
        "service": "Feature.fm API Test Dashboard",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Local::now().to_rfc3339(),
        "api_status": api_status,
        "environment": state.config.environment,
    }))
    .into_response()
}

pub async fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "Endpoint not found")
}
