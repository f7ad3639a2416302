//! API routes
//!
//! - `POST /register` - register a named event with a timeout and payload
//! - `POST /cancel` - cancel a pending event
//! - `POST /remaining` - query the time left before an event fires
//! - `POST /extend` - push a pending event's deadline further out
//! - `GET /health` - liveness plus the count of outstanding timers
//! - `POST /webhook` - loopback delivery sink for local runs

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub mod health;
pub mod timers;

/// Assemble all route modules into a single router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(timers::register))
        .route("/cancel", post(timers::cancel))
        .route("/remaining", post(timers::remaining))
        .route("/extend", post(timers::extend))
        .route("/health", get(health::health))
        .route("/webhook", post(health::webhook_sink))
}
