//! saturn HTTP API
//!
//! Thin plumbing between the transport and the timer registry: handlers decode
//! JSON requests, call one registry operation, and translate the closed set of
//! outcomes into responses. All registry semantics live in `saturn-registry`.

use saturn_registry::TimerRegistry;

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: TimerRegistry,
}

impl AppState {
    pub fn new(registry: TimerRegistry) -> Self {
        Self { registry }
    }
}
