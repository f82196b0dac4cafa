//! Batch conversion API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use optipress_core::{scheduler::BatchReport, BatchOptions, SchedulerError};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BatchErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<BatchErrorResponse>) {
    (
        status,
        Json(BatchErrorResponse {
            error: error.into(),
        }),
    )
}

/// Start a batch conversion run. The body is optional; an empty body runs a
/// full enumeration with defaults.
pub async fn start_batch(
    State(state): State<Arc<AppState>>,
    body: Option<Json<BatchOptions>>,
) -> Result<(StatusCode, Json<BatchReport>), (StatusCode, Json<BatchErrorResponse>)> {
    let options = body.map(|Json(options)| options).unwrap_or_default();

    match state.scheduler().start(options).await {
        Ok(report) => Ok((StatusCode::ACCEPTED, Json(report))),
        Err(SchedulerError::AlreadyRunning) => Err(error_response(
            StatusCode::CONFLICT,
            "a batch is already running",
        )),
        Err(SchedulerError::EmptyQueue) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "no eligible conversion tasks found",
        )),
        Err(e @ SchedulerError::EnumerationDisabled) => {
            Err(error_response(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
        )),
    }
}

/// Cancel the running batch.
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BatchReport>, (StatusCode, Json<BatchErrorResponse>)> {
    if state.scheduler().cancel().await {
        Ok(Json(state.scheduler().progress().await))
    } else {
        Err(error_response(StatusCode::CONFLICT, "no batch is running"))
    }
}

/// Current batch progress.
pub async fn get_progress(State(state): State<Arc<AppState>>) -> Json<BatchReport> {
    Json(state.scheduler().progress().await)
}
