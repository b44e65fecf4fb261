use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::contractors::ContractorService;
use crate::emails;
use crate::errors::{AppError, ResultExt};
use crate::models::{CadenceStage, FollowupsRun, Lead};
use crate::notifier::Notifier;
use crate::store::{claim_timestamp, Store, FOLLOWUP_BATCH_LIMIT};

/// Minimum age of the welcome email before the first follow-up.
pub fn followup_one_delay() -> ChronoDuration {
    ChronoDuration::days(1)
}

/// Minimum age of the first follow-up before the final reminder.
pub fn followup_two_delay() -> ChronoDuration {
    ChronoDuration::days(2)
}

/// The cadence stage a lead is due for at `now`, if any.
///
/// A lead without an email or without a welcome email is never due. At most
/// one stage is due per run.
pub fn due_stage(lead: &Lead, now: DateTime<Utc>) -> Option<CadenceStage> {
    if lead.email.trim().is_empty() {
        return None;
    }
    let welcome_at = lead.welcome_sent_at?;

    match (lead.followup_1_sent_at, lead.followup_2_sent_at) {
        (None, _) if now - welcome_at >= followup_one_delay() => Some(CadenceStage::FollowUp1),
        (Some(first_at), None) if now - first_at >= followup_two_delay() => {
            Some(CadenceStage::FollowUp2)
        }
        _ => None,
    }
}

/// Periodic cadence job: follow-up emails plus the stalled-agreement sweep.
#[derive(Clone)]
pub struct FollowupScheduler {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
    contractors: ContractorService,
}

impl FollowupScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
        contractors: ContractorService,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            contractors,
        }
    }

    fn request_link(&self) -> String {
        format!(
            "{}/#/request-audit",
            self.config.app_base_url.as_str().trim_end_matches('/')
        )
    }

    /// Runs one pass. Per-lead failures are counted, never fatal; a lead whose
    /// email failed keeps its timestamp unset and is retried next run.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<FollowupsRun, AppError> {
        let leads = self
            .store
            .list_leads_for_followup(FOLLOWUP_BATCH_LIMIT)
            .await
            .context("Failed to load leads for follow-up")?;

        let mut followup1_sent = 0;
        let mut followup2_sent = 0;
        let mut failed = 0;

        for lead in &leads {
            let Some(stage) = due_stage(lead, now) else {
                continue;
            };
            match self.advance(lead, stage).await {
                Ok(true) => match stage {
                    CadenceStage::FollowUp1 => followup1_sent += 1,
                    CadenceStage::FollowUp2 => followup2_sent += 1,
                    CadenceStage::Welcome => {}
                },
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!("Follow-up for lead {} failed: {}", lead.id, e);
                }
            }
        }

        let agreements_retried = match self.contractors.retry_stalled_agreements(now).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Stalled agreement sweep failed: {}", e);
                0
            }
        };

        tracing::info!(
            "Follow-up run: scanned={} followup1={} followup2={} failed={} agreements_retried={}",
            leads.len(),
            followup1_sent,
            followup2_sent,
            failed,
            agreements_retried
        );

        Ok(FollowupsRun {
            ok: true,
            followup1_sent,
            followup2_sent,
            failed,
            agreements_retried,
        })
    }

    /// Claims the stage, sends its email, and releases the claim on failure.
    /// Returns false when another run already claimed it.
    async fn advance(&self, lead: &Lead, stage: CadenceStage) -> Result<bool, AppError> {
        let at = claim_timestamp();
        if !self
            .store
            .claim_cadence_stage(lead.id, stage, at)
            .await
            .with_context(|| format!("Failed to claim {}", stage.column()))?
        {
            tracing::debug!("Lead {} {} already claimed", lead.id, stage.column());
            return Ok(false);
        }

        let link = self.request_link();
        let email = match stage {
            CadenceStage::FollowUp1 => {
                emails::followup_one(&lead.email, &lead.name, &lead.project_type, &link)
            }
            CadenceStage::FollowUp2 => emails::followup_two(&lead.email, &lead.name, &link),
            CadenceStage::Welcome => emails::welcome(&lead.email, &lead.name, &lead.project_type),
        };

        if let Err(e) = self.notifier.send(&email).await {
            if let Err(release_err) = self.store.release_cadence_stage(lead.id, stage, at).await {
                tracing::error!(
                    "Failed to release {} for lead {}: {}",
                    stage.column(),
                    lead.id,
                    release_err
                );
            }
            return Err(e);
        }

        Ok(true)
    }
}
