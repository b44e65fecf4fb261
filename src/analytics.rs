use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::errors::AppError;

/// Best-effort product analytics.
///
/// Every event becomes a `tracing` record under the `analytics` target. When
/// a webhook is configured the event is also POSTed there from a spawned task;
/// delivery failures are logged and never reach the caller.
#[derive(Clone)]
pub struct Analytics {
    client: reqwest::Client,
    webhook_url: Option<Url>,
}

impl Analytics {
    pub fn new(webhook_url: Option<Url>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create analytics client: {}", e))
            })?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    pub fn track(&self, event: &str, properties: Value) {
        tracing::info!(target: "analytics", event = event, properties = %properties, "analytics event");

        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();
        let body = json!({ "event": event, "properties": properties });
        let event = event.to_string();

        tokio::spawn(async move {
            match client.post(url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!("Analytics sink rejected '{}': {}", event, response.status())
                }
                Err(e) => tracing::warn!("Analytics delivery failed for '{}': {}", event, e),
            }
        });
    }
}
