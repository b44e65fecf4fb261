use std::sync::Arc;

use crate::config::Config;
use crate::emails;
use crate::errors::{AppError, ResultExt};
use crate::models::{AuthorizationAccepted, AuthorizationRequest};
use crate::notifier::Notifier;

/// Savings shown to the recovery team. Never negative.
pub fn savings(current_valuation: f64, authorized_rate: f64) -> f64 {
    (current_valuation - authorized_rate).max(0.0)
}

/// Forwards a signed homeowner authorization to the internal mailbox.
/// Nothing is persisted.
#[derive(Clone)]
pub struct AuthorizationService {
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
}

impl AuthorizationService {
    pub fn new(notifier: Arc<dyn Notifier>, config: Arc<Config>) -> Self {
        Self { notifier, config }
    }

    pub async fn submit_authorization(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorizationAccepted, AppError> {
        let notify_to = self
            .config
            .auth_notify_email
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Missing AUTH_NOTIFY_EMAIL".to_string()))?;

        let savings = savings(
            sanitize_amount(request.current_valuation),
            sanitize_amount(request.authorized_rate),
        );

        let email = emails::authorization_notice(notify_to, &request, savings);
        self.notifier
            .send(&email)
            .await
            .context("Failed to send authorization notification")?;

        tracing::info!(
            "✓ Authorization notice sent (permit {})",
            request.permit_id.as_deref().unwrap_or("N/A")
        );

        Ok(AuthorizationAccepted { ok: true, savings })
    }
}

fn sanitize_amount(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_savings_is_clamped_at_zero() {
        assert_eq!(savings(18_000.0, 12_500.0), 5_500.0);
        assert_eq!(savings(9_000.0, 12_500.0), 0.0);
        assert_eq!(savings(0.0, 0.0), 0.0);
    }
}
