use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use serde_json::json;
use std::time::Duration;

use super::{Notifier, OutboundEmail};
use crate::circuit_breaker::{create_email_circuit_breaker, EmailCircuitBreaker};
use crate::errors::AppError;

/// Client for the Resend transactional email API.
#[derive(Clone)]
pub struct ResendClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
    breaker: EmailCircuitBreaker,
}

impl ResendClient {
    /// Creates a new `ResendClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Resend API root, e.g. `https://api.resend.com`.
    /// * `api_key` - Bearer key for the account.
    /// * `from` - Sender address used on every email.
    pub fn new(base_url: &str, api_key: String, from: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Resend client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            from,
            breaker: create_email_circuit_breaker(),
        })
    }

    async fn post_email(&self, email: &OutboundEmail) -> Result<(), AppError> {
        let url = format!("{}/emails", self.base_url);
        let body = json!({
            "from": self.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Resend request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Resend API failed {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for ResendClient {
    async fn send(&self, email: &OutboundEmail) -> Result<(), AppError> {
        tracing::debug!("Sending '{}' to {}", email.subject, email.to);

        match self.breaker.call(self.post_email(email)).await {
            Ok(()) => {
                tracing::info!("✓ Email '{}' accepted by Resend", email.subject);
                Ok(())
            }
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Email circuit open, skipping '{}'", email.subject);
                Err(AppError::ExternalApiError(
                    "Email provider circuit open".to_string(),
                ))
            }
        }
    }
}
