use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use optipress_core::{scheduler::BatchReport, OrphanSweep, SanitizedConfig};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub uptime_secs: i64,
    pub conversions: u64,
    pub failures: u64,
    pub on_demand_hits: u64,
    pub on_demand_conversions: u64,
    pub space_saved: u64,
    pub batch: BatchReport,
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.optimizer().stats();
    let batch = state.scheduler().progress().await;
    Json(StatsResponse {
        uptime_secs: (chrono::Utc::now() - state.started_at()).num_seconds(),
        conversions: stats.conversions,
        failures: stats.failures,
        on_demand_hits: stats.on_demand_hits,
        on_demand_conversions: stats.on_demand_conversions,
        space_saved: stats.space_saved,
        batch,
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    collect_dynamic_metrics(&state);
    encode_metrics()
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub deleted: Vec<String>,
    pub freed_bytes: u64,
}

impl From<OrphanSweep> for SweepResponse {
    fn from(sweep: OrphanSweep) -> Self {
        Self {
            deleted: sweep
                .orphans
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            freed_bytes: sweep.freed_bytes,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Deletes artifacts whose original no longer exists.
///
/// Admin-only when an admin token is configured.
pub async fn sweep_orphans(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, (StatusCode, Json<ErrorResponse>)> {
    require_admin(&state, &headers)?;

    match state.optimizer().artifacts().delete_orphans().await {
        Ok(sweep) => Ok(Json(sweep.into())),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("orphan sweep failed: {}", e),
            }),
        )),
    }
}

fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if state.config().auth.admin_token.is_none() {
        return Ok(());
    }
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if state.is_admin_token(token) => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "admin token required".to_string(),
            }),
        )),
    }
}
