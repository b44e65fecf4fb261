//! Outbound transactional email.

use async_trait::async_trait;

use crate::errors::AppError;

pub mod recording;
pub mod resend;

pub use recording::RecordingNotifier;
pub use resend::ResendClient;

/// One rendered email. The body is already HTML-escaped where needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl OutboundEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
        }
    }
}

/// Sends a single email or reports why it could not. No retries, no queue.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), AppError>;
}
