use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::analytics::Analytics;
use crate::emails;
use crate::errors::{require_fields, AppError, ResultExt};
use crate::models::{CadenceStage, Lead, LeadSubmission, NewLead};
use crate::notifier::Notifier;
use crate::store::{claim_timestamp, Store};

/// Deadline for the lead insert before the caller gets a timeout error.
pub const LEAD_INSERT_TIMEOUT: Duration = Duration::from_secs(15);

/// A persisted lead plus the background welcome send it started.
pub struct SubmittedLead {
    pub lead: Lead,
    pub welcome_task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WelcomeOutcome {
    Sent,
    AlreadySent,
}

/// Normalizes a US phone number to E.164.
///
/// Anything that does not parse as a valid US number is kept as typed
/// (trimmed); a lead is never rejected over its phone format.
pub fn normalize_us_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    match phonenumber::parse(Some(CountryId::US), trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => {
            number.format().mode(Mode::E164).to_string()
        }
        Ok(_) => {
            tracing::debug!("Keeping non-US or invalid phone as entered: {}", trimmed);
            trimmed.to_string()
        }
        Err(e) => {
            tracing::debug!("Phone '{}' did not parse ({:?}), keeping as entered", trimmed, e);
            trimmed.to_string()
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Homeowner lead intake and the welcome email.
#[derive(Clone)]
pub struct LeadService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    analytics: Analytics,
}

impl LeadService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, analytics: Analytics) -> Self {
        Self {
            store,
            notifier,
            analytics,
        }
    }

    /// Persists a lead, then starts the welcome email and the analytics
    /// event without waiting for either.
    pub async fn submit_lead(&self, submission: LeadSubmission) -> Result<SubmittedLead, AppError> {
        require_fields(&[
            ("name", submission.name.as_deref()),
            ("phone", submission.phone.as_deref()),
            ("email", submission.email.as_deref()),
            ("zipCode", submission.zip_code.as_deref()),
            ("projectType", submission.project_type.as_deref()),
        ])?;

        let new_lead = NewLead {
            name: submission.name.unwrap_or_default().trim().to_string(),
            phone: normalize_us_phone(&submission.phone.unwrap_or_default()),
            email: submission.email.unwrap_or_default().trim().to_string(),
            zip_code: submission.zip_code.unwrap_or_default().trim().to_string(),
            project_type: submission.project_type.unwrap_or_default().trim().to_string(),
            contractor_name: trimmed(submission.contractor_name),
            notes: trimmed(submission.notes),
        };

        let lead = tokio::time::timeout(LEAD_INSERT_TIMEOUT, self.store.insert_lead(&new_lead))
            .await
            .map_err(|_| {
                AppError::Timeout("Lead submission timed out after 15 seconds".to_string())
            })?
            .context("Failed to submit lead")?;

        tracing::info!("✓ Lead {} stored ({})", lead.id, lead.project_type);

        self.analytics.track(
            "lead_submit",
            json!({ "industry": lead.project_type, "zip": lead.zip_code }),
        );

        let service = self.clone();
        let lead_id = lead.id;
        let welcome_task = tokio::spawn(async move {
            match service.send_welcome(lead_id).await {
                Ok(WelcomeOutcome::Sent) => {}
                Ok(WelcomeOutcome::AlreadySent) => {
                    tracing::debug!("Welcome for lead {} already sent", lead_id)
                }
                Err(e) => tracing::error!("Welcome email for lead {} failed: {}", lead_id, e),
            }
        });

        Ok(SubmittedLead { lead, welcome_task })
    }

    /// Sends the welcome email at most once per lead.
    ///
    /// `welcome_sent_at` is claimed before sending and released again if the
    /// provider fails, so a later trigger can retry.
    pub async fn send_welcome(&self, lead_id: Uuid) -> Result<WelcomeOutcome, AppError> {
        let lead = self
            .store
            .get_lead(lead_id)
            .await
            .context("Failed to load lead")?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead_id)))?;

        if lead.welcome_sent_at.is_some() {
            return Ok(WelcomeOutcome::AlreadySent);
        }

        let at = claim_timestamp();
        if !self
            .store
            .claim_cadence_stage(lead.id, CadenceStage::Welcome, at)
            .await
            .context("Failed to record welcome email")?
        {
            tracing::warn!("Welcome for lead {} claimed concurrently, skipping", lead.id);
            return Ok(WelcomeOutcome::AlreadySent);
        }

        let email = emails::welcome(&lead.email, &lead.name, &lead.project_type);
        if let Err(e) = self.notifier.send(&email).await {
            if let Err(release_err) = self
                .store
                .release_cadence_stage(lead.id, CadenceStage::Welcome, at)
                .await
            {
                tracing::error!(
                    "Failed to release welcome claim for lead {}: {}",
                    lead.id,
                    release_err
                );
            }
            return Err(e).context("Failed to send welcome email");
        }

        tracing::info!("✓ Welcome email sent for lead {}", lead.id);
        Ok(WelcomeOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::models::{
        AuditRecord, Contractor, ContractorStatus, ContractorUpdate, NewContractor, PublicAudit,
    };
    use crate::notifier::RecordingNotifier;
    use crate::store::MemoryStore;

    /// Store whose lead insert never returns; everything else is in memory.
    struct StalledStore(MemoryStore);

    #[async_trait]
    impl Store for StalledStore {
        async fn insert_lead(&self, _lead: &NewLead) -> Result<Lead, AppError> {
            std::future::pending().await
        }

        async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
            self.0.get_lead(id).await
        }

        async fn list_leads_for_followup(&self, limit: i64) -> Result<Vec<Lead>, AppError> {
            self.0.list_leads_for_followup(limit).await
        }

        async fn claim_cadence_stage(
            &self,
            lead_id: Uuid,
            stage: CadenceStage,
            at: DateTime<Utc>,
        ) -> Result<bool, AppError> {
            self.0.claim_cadence_stage(lead_id, stage, at).await
        }

        async fn release_cadence_stage(
            &self,
            lead_id: Uuid,
            stage: CadenceStage,
            at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            self.0.release_cadence_stage(lead_id, stage, at).await
        }

        async fn insert_audit(&self, audit: &AuditRecord) -> Result<(), AppError> {
            self.0.insert_audit(audit).await
        }

        async fn get_audit(&self, id: Uuid) -> Result<Option<AuditRecord>, AppError> {
            self.0.get_audit(id).await
        }

        async fn get_public_audit(&self, secure_id: Uuid) -> Result<Option<PublicAudit>, AppError> {
            self.0.get_public_audit(secure_id).await
        }

        async fn insert_contractor(
            &self,
            contractor: &NewContractor,
        ) -> Result<Contractor, AppError> {
            self.0.insert_contractor(contractor).await
        }

        async fn get_contractor(&self, id: Uuid) -> Result<Option<Contractor>, AppError> {
            self.0.get_contractor(id).await
        }

        async fn find_contractor_by_token(
            &self,
            token: &str,
        ) -> Result<Option<Contractor>, AppError> {
            self.0.find_contractor_by_token(token).await
        }

        async fn list_contractors(&self) -> Result<Vec<Contractor>, AppError> {
            self.0.list_contractors().await
        }

        async fn list_stalled_approvals(
            &self,
            approved_before: DateTime<Utc>,
        ) -> Result<Vec<Contractor>, AppError> {
            self.0.list_stalled_approvals(approved_before).await
        }

        async fn update_contractor(
            &self,
            id: Uuid,
            expected: &[ContractorStatus],
            update: &ContractorUpdate,
        ) -> Result<bool, AppError> {
            self.0.update_contractor(id, expected, update).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_insert_times_out_with_504() {
        let notifier = Arc::new(RecordingNotifier::new());
        let service = LeadService::new(
            Arc::new(StalledStore(MemoryStore::new())),
            notifier.clone(),
            Analytics::new(None).unwrap(),
        );

        let submission = LeadSubmission {
            name: Some("Jordan Reyes".to_string()),
            phone: Some("201-555-0123".to_string()),
            email: Some("jordan@example.com".to_string()),
            zip_code: Some("85018".to_string()),
            project_type: Some("HVAC Replacement".to_string()),
            ..Default::default()
        };

        let err = match service.submit_lead(submission).await {
            Ok(_) => panic!("stalled insert should time out"),
            Err(err) => err,
        };

        assert!(matches!(err, AppError::Timeout(_)), "got {:?}", err);
        let (status, message) = err.status_and_message();
        assert_eq!(status.as_u16(), 504);
        assert_eq!(message, "Lead submission timed out after 15 seconds");
        assert!(notifier.sent().await.is_empty());
    }

    #[test]
    fn test_normalize_us_phone() {
        assert_eq!(normalize_us_phone("(201) 555-0123"), "+12015550123");
        assert_eq!(normalize_us_phone(" 201.555.0123 "), "+12015550123");
        assert_eq!(normalize_us_phone("+1 201 555 0123"), "+12015550123");
    }

    #[test]
    fn test_unparseable_phone_is_kept() {
        assert_eq!(normalize_us_phone("  call after 5pm "), "call after 5pm");
        assert_eq!(normalize_us_phone("12"), "12");
    }
}
