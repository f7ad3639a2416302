//! Configuration consumed by the registry core.

use std::time::Duration;

use url::Url;

/// Configuration surface for the timer registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Destination for fired-event delivery calls.
    pub callback_url: Url,
    /// Upper bound on any single registration's or extension's total duration.
    pub max_timeout: Duration,
}

impl RegistryConfig {
    pub fn new(callback_url: Url, max_timeout: Duration) -> Self {
        Self {
            callback_url,
            max_timeout,
        }
    }
}
