//! Health check endpoint

use axum::{Json, extract::State};
use serde::Serialize;
use shared::error::ApiResponse;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    system_info: SystemInfo,
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    environment: String,
    version: &'static str,
}

/// GET /v1/healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "available",
        system_info: SystemInfo {
            environment: state.config.environment.clone(),
            version: env!("CARGO_PKG_VERSION"),
        },
    }))
}
