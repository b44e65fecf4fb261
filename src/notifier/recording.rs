use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;

use super::{Notifier, OutboundEmail};
use crate::errors::AppError;

/// Notifier that keeps every email in memory instead of sending it.
///
/// Recipients added with [`RecordingNotifier::fail_for`] get an
/// `ExternalApiError` and are not recorded as sent.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: Mutex<HashSet<String>>,
    fail_all: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_for(&self, recipient: &str) {
        self.failing.lock().await.insert(recipient.to_string());
    }

    pub async fn fail_everything(&self, fail: bool) {
        *self.fail_all.lock().await = fail;
    }

    pub async fn recover(&self, recipient: &str) {
        self.failing.lock().await.remove(recipient);
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, recipient: &str) -> Vec<OutboundEmail> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|e| e.to == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<(), AppError> {
        if *self.fail_all.lock().await || self.failing.lock().await.contains(&email.to) {
            return Err(AppError::ExternalApiError(format!(
                "Simulated delivery failure to {}",
                email.to
            )));
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}
