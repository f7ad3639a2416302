//! Error-to-response mapping.
//!
//! Failure responses carry the same `{event_id, message}` shape as success
//! responses, so a client can always correlate an error with the event it
//! asked about. Each variant maps to one explicit status code; in particular
//! a duplicate registration is an explicit 409, never a default-success.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Client-visible API error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("illegal duration of {timeout_seconds} seconds")]
    InvalidDuration {
        event_id: String,
        timeout_seconds: i64,
    },

    #[error("existing timer attached with event {event_id}")]
    AlreadyRegistered { event_id: String },

    #[error("no event with event_id {event_id} has been registered")]
    NotFound { event_id: String },

    #[error("event with event_id {event_id} has already been fired")]
    AlreadyFired { event_id: String },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidDuration { .. } => StatusCode::BAD_REQUEST,
            ApiError::AlreadyRegistered { .. } | ApiError::AlreadyFired { .. } => {
                StatusCode::CONFLICT
            }
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    fn event_id(&self) -> &str {
        match self {
            ApiError::InvalidDuration { event_id, .. }
            | ApiError::AlreadyRegistered { event_id }
            | ApiError::NotFound { event_id }
            | ApiError::AlreadyFired { event_id } => event_id,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    event_id: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            event_id: self.event_id().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_maps_to_conflict() {
        let err = ApiError::AlreadyRegistered {
            event_id: "a".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn already_fired_cancel_maps_to_conflict() {
        let err = ApiError::AlreadyFired {
            event_id: "a".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("already been fired"));
    }

    #[test]
    fn unknown_event_maps_to_not_found() {
        let err = ApiError::NotFound {
            event_id: "a".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_duration_maps_to_bad_request() {
        let err = ApiError::InvalidDuration {
            event_id: "a".to_string(),
            timeout_seconds: -1,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("-1"));
    }
}
