//! Outbound webhook delivery

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Body POSTed to a registration's webhook URL.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookMessage {
    pub template: &'static str,
    pub data: Value,
}

impl WebhookMessage {
    /// Notification that an NWC event arrived for a registration.
    pub fn nwc_event(event_id: &str) -> Self {
        Self {
            template: "nwc_event",
            data: json!({ "event_id": event_id }),
        }
    }
}

/// Shared HTTP client for webhook POSTs.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    /// # Panics
    /// Panics if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { http }
    }

    /// POST the notification for `event_id` to `url`. Any status outside
    /// `[200, 300)` is a delivery failure; the response body is ignored.
    pub async fn notify(&self, url: &str, event_id: &str) -> Result<()> {
        let message = WebhookMessage::nwc_event(event_id);
        let response = self
            .http
            .post(url)
            .json(&message)
            .send()
            .await
            .map_err(|e| Error::webhook_delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::webhook_delivery(format!(
                "webhook returned status {status}"
            )));
        }

        debug!("successfully forwarded event {event_id}");
        Ok(())
    }
}
