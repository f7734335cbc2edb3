//! Health endpoint.
//!
//! A dead event consumer is a health-check failure, not a silent
//! degradation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::dto::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub event_consumer_alive: bool,
    pub open_gateway_handles: usize,
}

pub async fn health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthStatus>>) {
    let consumer_alive = state.consumer_healthy.load(Ordering::Acquire);
    let status = HealthStatus {
        status: if consumer_alive { "ok" } else { "degraded" },
        event_consumer_alive: consumer_alive,
        open_gateway_handles: state.gateways.open_handles(),
    };
    let code = if consumer_alive { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(ApiResponse::ok(status)))
}
