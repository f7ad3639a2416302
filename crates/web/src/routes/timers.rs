//! Timer endpoints: register, cancel, remaining, extend.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use saturn_registry::{CancelOutcome, ExtendOutcome, RegisterOutcome};

use crate::AppState;
use crate::error::{ApiError, Result};

/// Request to register a new delayed event.
#[derive(Debug, Deserialize)]
pub struct TimeoutEvent {
    pub event_id: String,
    /// Signed so that non-positive values reach validation instead of
    /// failing deserialization.
    pub timeout_seconds: i64,
    #[serde(default)]
    pub emit_payload: String,
}

/// Request naming one pending event (cancel, remaining).
#[derive(Debug, Deserialize)]
pub struct EventRef {
    pub event_id: String,
}

/// Request to extend a pending event by `timeout_seconds` more.
#[derive(Debug, Deserialize)]
pub struct ExtendEvent {
    pub event_id: String,
    pub timeout_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct TimerResponse {
    pub event_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RemainingResponse {
    pub event_id: String,
    /// Seconds until the event fires, as a fraction.
    pub time_remaining: f64,
    pub message: String,
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<TimeoutEvent>,
) -> Result<(StatusCode, Json<TimerResponse>)> {
    info!(
        event_id = %request.event_id,
        timeout_seconds = request.timeout_seconds,
        "received register request"
    );

    let outcome = state
        .registry
        .register(&request.event_id, request.timeout_seconds, request.emit_payload)
        .await;

    match outcome {
        RegisterOutcome::Created => Ok((
            StatusCode::CREATED,
            Json(TimerResponse {
                message: format!(
                    "registered event {} to fire in {} seconds",
                    request.event_id, request.timeout_seconds
                ),
                event_id: request.event_id,
            }),
        )),
        RegisterOutcome::AlreadyExists => Err(ApiError::AlreadyRegistered {
            event_id: request.event_id,
        }),
        RegisterOutcome::InvalidDuration => Err(ApiError::InvalidDuration {
            event_id: request.event_id,
            timeout_seconds: request.timeout_seconds,
        }),
    }
}

/// POST /cancel
pub async fn cancel(
    State(state): State<AppState>,
    Json(request): Json<EventRef>,
) -> Result<Json<TimerResponse>> {
    info!(event_id = %request.event_id, "received cancel request");

    match state.registry.cancel(&request.event_id).await {
        CancelOutcome::Cancelled => Ok(Json(TimerResponse {
            message: format!("cancelled event with event_id {}", request.event_id),
            event_id: request.event_id,
        })),
        CancelOutcome::NotFound => Err(ApiError::NotFound {
            event_id: request.event_id,
        }),
        CancelOutcome::AlreadyFired => Err(ApiError::AlreadyFired {
            event_id: request.event_id,
        }),
    }
}

/// POST /remaining
pub async fn remaining(
    State(state): State<AppState>,
    Json(request): Json<EventRef>,
) -> Result<Json<RemainingResponse>> {
    match state.registry.remaining(&request.event_id).await {
        Some(remaining) => {
            let time_remaining = remaining.as_secs_f64();
            Ok(Json(RemainingResponse {
                message: format!(
                    "remaining time for event_id {} is {time_remaining:.3}s",
                    request.event_id
                ),
                event_id: request.event_id,
                time_remaining,
            }))
        }
        None => Err(ApiError::NotFound {
            event_id: request.event_id,
        }),
    }
}

/// POST /extend
pub async fn extend(
    State(state): State<AppState>,
    Json(request): Json<ExtendEvent>,
) -> Result<Json<TimerResponse>> {
    info!(
        event_id = %request.event_id,
        timeout_seconds = request.timeout_seconds,
        "received extend request"
    );

    match state
        .registry
        .extend(&request.event_id, request.timeout_seconds)
        .await
    {
        ExtendOutcome::Extended { new_total } => Ok(Json(TimerResponse {
            message: format!(
                "extended timer for event_id {} to fire in {:.3}s",
                request.event_id,
                new_total.as_secs_f64()
            ),
            event_id: request.event_id,
        })),
        ExtendOutcome::NotFound => Err(ApiError::NotFound {
            event_id: request.event_id,
        }),
        ExtendOutcome::InvalidDuration => Err(ApiError::InvalidDuration {
            event_id: request.event_id,
            timeout_seconds: request.timeout_seconds,
        }),
    }
}
