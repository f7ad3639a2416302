//! Outbound delivery of fired events.
//!
//! Delivery is best-effort: the registry considers an event terminal once its
//! record has been removed, whether or not the outbound call succeeds. There
//! is no retry queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Payload delivered to the callback destination when an event fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiredEvent {
    /// Identifier of the event that fired.
    pub event_id: String,
    /// The emit payload supplied at registration (or unchanged by extension).
    pub message: String,
    /// When the active schedule was established: registration time, or the
    /// most recent successful extension.
    pub time_initiated: DateTime<Utc>,
}

/// Delivery failure. Logged and swallowed by the firing path; the event is
/// already terminal by the time delivery is attempted.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Outbound caller that forwards a fired event's payload to its destination.
#[async_trait]
pub trait DeliverEvent: Send + Sync {
    async fn deliver(&self, event: FiredEvent) -> Result<(), DeliveryError>;
}

/// Production delivery client: POSTs the fired event as JSON to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    url: Url,
}

impl WebhookClient {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl DeliverEvent for WebhookClient {
    async fn deliver(&self, event: FiredEvent) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&event)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Status(response.status()));
        }

        debug!(event_id = %event.event_id, url = %self.url, "delivered fired event");
        Ok(())
    }
}
