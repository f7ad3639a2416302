//! Health endpoint and the loopback webhook sink.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use saturn_registry::FiredEvent;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Unix timestamp of the snapshot.
    pub time: i64,
    pub data: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let running = state.registry.outstanding().await;
    Json(HealthResponse {
        time: Utc::now().timestamp(),
        data: format!("saturn is up: {running} timer(s) running"),
    })
}

/// POST /webhook
///
/// Placeholder delivery destination so the service can be pointed at itself
/// during local runs; logs what a real consumer would receive.
pub async fn webhook_sink(Json(event): Json<FiredEvent>) -> StatusCode {
    info!(
        event_id = %event.event_id,
        message = %event.message,
        time_initiated = %event.time_initiated,
        "received fired event on loopback webhook"
    );
    StatusCode::OK
}
