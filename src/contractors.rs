//! Contractor partner onboarding.
//!
//! Rate-card intake creates the row at `pending_review`. An analyst approves
//! it, which emails the contractor a tokenised agreement link; signing through
//! that link makes them an active partner. Every status write is guarded on
//! the row's current status, so concurrent actions cannot skip a state.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::emails;
use crate::errors::{missing_fields, AppError, ResultExt};
use crate::models::{
    AgreementDispatched, AgreementSigned, AgreementSubmission, AgreementView, Contractor,
    ContractorStatus, ContractorStatusChanged, ContractorSummary, ContractorUpdate, NewContractor,
    RateCardSubmission,
};
use crate::notifier::Notifier;
use crate::security::generate_agreement_token;
use crate::store::{claim_timestamp, Store};

const DEFAULT_ROC_CLASSIFICATION: &str = "C-39";
/// Approved contractors whose agreement has not gone out after this long are
/// picked up by the periodic job.
pub const STALLED_APPROVAL_MINUTES: i64 = 10;

const AGREEMENT_NOT_FOUND: &str = "Agreement record not found";

/// Actions that move a contractor between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractorAction {
    Approve,
    SendAgreement,
    Sign,
    Reject,
}

impl ContractorAction {
    /// Statuses this action may start from.
    pub fn legal_sources(self) -> &'static [ContractorStatus] {
        use ContractorStatus::*;
        match self {
            ContractorAction::Approve => &[PendingReview, Approved],
            ContractorAction::SendAgreement => &[Approved, AgreementSent],
            ContractorAction::Sign => &[AgreementSent],
            ContractorAction::Reject => &[PendingReview, Approved, AgreementSent, Rejected],
        }
    }

    pub fn target(self) -> ContractorStatus {
        match self {
            ContractorAction::Approve => ContractorStatus::Approved,
            ContractorAction::SendAgreement => ContractorStatus::AgreementSent,
            ContractorAction::Sign => ContractorStatus::ActivePartner,
            ContractorAction::Reject => ContractorStatus::Rejected,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            ContractorAction::Approve => "approve",
            ContractorAction::SendAgreement => "send an agreement to",
            ContractorAction::Sign => "sign for",
            ContractorAction::Reject => "reject",
        }
    }
}

/// Validates a transition, returning the resulting status.
pub fn next_status(
    current: ContractorStatus,
    action: ContractorAction,
) -> Result<ContractorStatus, AppError> {
    if action.legal_sources().contains(&current) {
        Ok(action.target())
    } else {
        Err(AppError::Conflict(format!(
            "Cannot {} a contractor in status '{}'",
            action.verb(),
            current
        )))
    }
}

fn required_text(value: Option<String>) -> String {
    value.unwrap_or_default().trim().to_string()
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Validates a rate card and turns it into an insertable row with a fresh
/// agreement token.
pub fn new_contractor(submission: RateCardSubmission) -> Result<NewContractor, AppError> {
    let mut missing = missing_fields(&[
        ("legalEntityName", submission.legal_entity_name.as_deref()),
        ("rocLicenseNumber", submission.roc_license_number.as_deref()),
        ("ownerPrincipalName", submission.owner_principal_name.as_deref()),
        ("directCell", submission.direct_cell.as_deref()),
        ("businessEmail", submission.business_email.as_deref()),
        ("businessAddress", submission.business_address.as_deref()),
        ("commercialCrewCount", submission.commercial_crew_count.as_deref()),
        ("w9Url", submission.w9_url.as_deref()),
        ("coiUrl", submission.coi_url.as_deref()),
        (
            "generalLiabilityCoverageAmount",
            submission.general_liability_coverage_amount.as_deref(),
        ),
        (
            "workersCompPolicyNumber",
            submission.workers_comp_policy_number.as_deref(),
        ),
    ]);
    if submission.license_expiration_date.is_none() {
        missing.push("licenseExpirationDate");
    }
    if !missing.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if !(submission.permit_responsibility_confirmed
        && submission.inspection_responsibility_confirmed
        && submission.rate_lock_confirmed)
    {
        return Err(AppError::BadRequest(
            "Permit, inspection and rate-lock responsibilities must all be confirmed".to_string(),
        ));
    }

    let license_expiration_date = submission
        .license_expiration_date
        .ok_or_else(|| AppError::BadRequest("Missing required fields: licenseExpirationDate".to_string()))?;

    Ok(NewContractor {
        legal_entity_name: required_text(submission.legal_entity_name),
        dba: optional_text(submission.dba),
        roc_license_number: required_text(submission.roc_license_number),
        roc_classification: optional_text(submission.roc_classification)
            .unwrap_or_else(|| DEFAULT_ROC_CLASSIFICATION.to_string()),
        license_expiration_date,
        owner_principal_name: required_text(submission.owner_principal_name),
        direct_cell: required_text(submission.direct_cell),
        business_email: required_text(submission.business_email),
        business_address: required_text(submission.business_address),
        years_in_business: submission.years_in_business,
        commercial_crew_count: required_text(submission.commercial_crew_count),
        residential_crew_count: submission.residential_crew_count,
        average_weekly_install_capacity: submission.average_weekly_install_capacity,
        current_backlog_weeks: submission.current_backlog_weeks,
        w9_url: required_text(submission.w9_url),
        coi_url: required_text(submission.coi_url),
        general_liability_coverage_amount: required_text(
            submission.general_liability_coverage_amount,
        ),
        workers_comp_policy_number: required_text(submission.workers_comp_policy_number),
        bonding_capacity: optional_text(submission.bonding_capacity),
        service_capabilities: submission.service_capabilities,
        execution_rate_card: submission.execution_rate_card,
        permit_responsibility_confirmed: submission.permit_responsibility_confirmed,
        inspection_responsibility_confirmed: submission.inspection_responsibility_confirmed,
        rate_lock_confirmed: submission.rate_lock_confirmed,
        agreement_token: generate_agreement_token(),
    })
}

#[derive(Clone)]
pub struct ContractorService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
}

impl ContractorService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: Arc<Config>) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// `{APP_BASE_URL}/partner/master-subcontractor?token=<token>`
    pub fn agreement_link(&self, token: &str) -> String {
        format!(
            "{}/partner/master-subcontractor?token={}",
            self.config.app_base_url.as_str().trim_end_matches('/'),
            token
        )
    }

    async fn load(&self, id: Uuid) -> Result<Contractor, AppError> {
        self.store
            .get_contractor(id)
            .await
            .context("Failed to load contractor")?
            .ok_or_else(|| AppError::NotFound("Contractor not found".to_string()))
    }

    /// Applies a guarded status write, mapping a lost race to a conflict.
    async fn transition(
        &self,
        contractor: &Contractor,
        action: ContractorAction,
        update: ContractorUpdate,
    ) -> Result<(), AppError> {
        next_status(contractor.status, action)?;

        let applied = self
            .store
            .update_contractor(contractor.id, action.legal_sources(), &update)
            .await
            .with_context(|| format!("Failed to update contractor {}", contractor.id))?;

        if !applied {
            tracing::warn!(
                "Contractor {} changed status concurrently, {:?} not applied",
                contractor.id,
                action
            );
            return Err(AppError::Conflict(
                "Contractor status changed concurrently".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn submit_rate_card(
        &self,
        submission: RateCardSubmission,
    ) -> Result<Contractor, AppError> {
        let new_contractor = new_contractor(submission)?;
        let contractor = self
            .store
            .insert_contractor(&new_contractor)
            .await
            .context("Failed to submit rate card")?;

        tracing::info!(
            "✓ Rate card submitted: {} ({})",
            contractor.legal_entity_name,
            contractor.id
        );
        Ok(contractor)
    }

    /// Partner review list, newest first.
    pub async fn list(&self) -> Result<Vec<ContractorSummary>, AppError> {
        let contractors = self
            .store
            .list_contractors()
            .await
            .context("Failed to load contractors")?;
        Ok(contractors.iter().map(ContractorSummary::from).collect())
    }

    /// Approves a contractor and immediately sends the agreement.
    ///
    /// Approval is kept even when the send fails: the error is returned and
    /// the periodic job retries the send for contractors left in `approved`.
    pub async fn approve(&self, id: Uuid) -> Result<ContractorStatusChanged, AppError> {
        let contractor = self.load(id).await?;
        self.transition(
            &contractor,
            ContractorAction::Approve,
            ContractorUpdate::Approve {
                at: claim_timestamp(),
            },
        )
        .await?;
        tracing::info!("✓ Contractor {} approved", id);

        let dispatched = self
            .send_agreement(id)
            .await
            .context("Contractor approved but the agreement could not be sent yet")?;

        Ok(ContractorStatusChanged {
            ok: true,
            status: ContractorStatus::AgreementSent,
            agreement_link: Some(dispatched.agreement_link),
        })
    }

    /// Emails the agreement link and marks the contractor `agreement_sent`.
    ///
    /// The status is claimed first. If the contractor email fails on a first
    /// send, the claim is reverted to `approved`; a failed internal notice is
    /// only logged.
    pub async fn send_agreement(&self, id: Uuid) -> Result<AgreementDispatched, AppError> {
        let contractor = self.load(id).await?;
        let first_send = contractor.status == ContractorStatus::Approved;
        let previous_sent_at = contractor.agreement_sent_at;

        self.transition(
            &contractor,
            ContractorAction::SendAgreement,
            ContractorUpdate::MarkAgreementSent {
                at: claim_timestamp(),
            },
        )
        .await?;

        let link = self.agreement_link(&contractor.agreement_token);
        let email = emails::agreement_link(&contractor, &link);

        if let Err(e) = self.notifier.send(&email).await {
            if first_send {
                let revert = ContractorUpdate::RevertAgreementSent { previous_sent_at };
                match self
                    .store
                    .update_contractor(id, &[ContractorStatus::AgreementSent], &revert)
                    .await
                {
                    Ok(true) => tracing::info!("Contractor {} reverted to approved", id),
                    Ok(false) => tracing::warn!("Contractor {} moved on before revert", id),
                    Err(revert_err) => {
                        tracing::error!("Failed to revert contractor {}: {}", id, revert_err)
                    }
                }
            }
            return Err(e).context("Failed to send agreement");
        }

        if let Some(notify_to) = self.config.auth_notify_email.as_deref() {
            let notice = emails::agreement_sent_notice(notify_to, &contractor);
            if let Err(e) = self.notifier.send(&notice).await {
                tracing::warn!("Agreement-sent notice for {} failed: {}", id, e);
            }
        }

        tracing::info!("✓ Agreement sent to contractor {}", id);
        Ok(AgreementDispatched {
            ok: true,
            agreement_link: link,
        })
    }

    async fn find_open_agreement(&self, token: &str) -> Result<Contractor, AppError> {
        let contractor = self
            .store
            .find_contractor_by_token(token)
            .await
            .context("Failed to load agreement")?;

        match contractor {
            Some(c) if c.status == ContractorStatus::AgreementSent => Ok(c),
            Some(c) => {
                tracing::debug!(
                    "Agreement token used for contractor {} in status {}",
                    c.id,
                    c.status
                );
                Err(AppError::NotFound(AGREEMENT_NOT_FOUND.to_string()))
            }
            None => Err(AppError::NotFound(AGREEMENT_NOT_FOUND.to_string())),
        }
    }

    /// Agreement details behind a token. Only open (sent, unsigned)
    /// agreements resolve; anything else is not found.
    pub async fn load_agreement(&self, token: Option<&str>) -> Result<AgreementView, AppError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let Some(token) = token else {
            return Err(AppError::BadRequest("Missing token".to_string()));
        };

        let contractor = self.find_open_agreement(token).await?;
        Ok(AgreementView::from(&contractor))
    }

    /// Records the signature and sends both confirmations.
    ///
    /// Confirmation emails are best-effort once the signature is stored;
    /// `confirmation_emailed` reports whether they all went out.
    pub async fn submit_agreement(
        &self,
        submission: AgreementSubmission,
    ) -> Result<AgreementSigned, AppError> {
        let missing = missing_fields(&[
            ("token", submission.token.as_deref()),
            ("signerName", submission.signer_name.as_deref()),
            ("signerTitle", submission.signer_title.as_deref()),
            ("signedPdfUrl", submission.signed_pdf_url.as_deref()),
        ]);
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let token = required_text(submission.token);
        let signer_name = required_text(submission.signer_name);
        let signer_title = required_text(submission.signer_title);
        let signed_pdf_url = required_text(submission.signed_pdf_url);

        let contractor = self.find_open_agreement(&token).await?;
        let update = ContractorUpdate::Sign {
            signer_name: signer_name.clone(),
            signer_title: signer_title.clone(),
            signed_pdf_url: signed_pdf_url.clone(),
            at: claim_timestamp(),
        };

        let applied = self
            .store
            .update_contractor(
                contractor.id,
                ContractorAction::Sign.legal_sources(),
                &update,
            )
            .await
            .context("Failed to record agreement")?;
        if !applied {
            // Another submission with the same token won the race
            return Err(AppError::NotFound(AGREEMENT_NOT_FOUND.to_string()));
        }
        tracing::info!("✓ Contractor {} is now an active partner", contractor.id);

        let mut recipients = vec![contractor.business_email.clone()];
        if let Some(notify_to) = self.config.auth_notify_email.as_deref() {
            recipients.push(notify_to.to_string());
        }

        let mut confirmation_emailed = true;
        for to in recipients {
            let email = emails::agreement_completed(
                &to,
                &contractor,
                &signer_name,
                &signer_title,
                &signed_pdf_url,
            );
            if let Err(e) = self.notifier.send(&email).await {
                tracing::warn!(
                    "Agreement confirmation for {} to {} failed: {}",
                    contractor.id,
                    to,
                    e
                );
                confirmation_emailed = false;
            }
        }

        Ok(AgreementSigned {
            ok: true,
            confirmation_emailed,
        })
    }

    pub async fn reject(&self, id: Uuid) -> Result<ContractorStatusChanged, AppError> {
        let contractor = self.load(id).await?;
        self.transition(&contractor, ContractorAction::Reject, ContractorUpdate::Reject)
            .await?;
        tracing::info!("Contractor {} rejected", id);

        Ok(ContractorStatusChanged {
            ok: true,
            status: ContractorStatus::Rejected,
            agreement_link: None,
        })
    }

    /// Resends agreements for approvals that never got one. Returns how many
    /// went out; individual failures are logged and left for the next run.
    pub async fn retry_stalled_agreements(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let cutoff = now - ChronoDuration::minutes(STALLED_APPROVAL_MINUTES);
        let stalled = self
            .store
            .list_stalled_approvals(cutoff)
            .await
            .context("Failed to load stalled approvals")?;

        let mut sent = 0;
        for contractor in stalled {
            match self.send_agreement(contractor.id).await {
                Ok(_) => sent += 1,
                Err(e) => tracing::warn!(
                    "Agreement retry for contractor {} failed: {}",
                    contractor.id,
                    e
                ),
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContractorStatus::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(next_status(PendingReview, ContractorAction::Approve).unwrap(), Approved);
        assert_eq!(next_status(Approved, ContractorAction::Approve).unwrap(), Approved);
        assert_eq!(
            next_status(Approved, ContractorAction::SendAgreement).unwrap(),
            AgreementSent
        );
        assert_eq!(
            next_status(AgreementSent, ContractorAction::SendAgreement).unwrap(),
            AgreementSent
        );
        assert_eq!(
            next_status(AgreementSent, ContractorAction::Sign).unwrap(),
            ActivePartner
        );
        assert_eq!(next_status(Rejected, ContractorAction::Reject).unwrap(), Rejected);
    }

    #[test]
    fn test_illegal_transitions_conflict() {
        for (from, action) in [
            (ActivePartner, ContractorAction::Reject),
            (ActivePartner, ContractorAction::Approve),
            (Rejected, ContractorAction::Approve),
            (PendingReview, ContractorAction::SendAgreement),
            (PendingReview, ContractorAction::Sign),
            (Approved, ContractorAction::Sign),
            (AgreementSent, ContractorAction::Approve),
        ] {
            match next_status(from, action) {
                Err(AppError::Conflict(_)) => {}
                other => panic!("{:?} from {:?} should conflict, got {:?}", action, from, other),
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for action in [
            ContractorAction::Approve,
            ContractorAction::SendAgreement,
            ContractorAction::Sign,
            ContractorAction::Reject,
        ] {
            assert!(next_status(ActivePartner, action).is_err());
        }
    }

    #[test]
    fn test_rate_card_requires_confirmations() {
        let submission = RateCardSubmission {
            legal_entity_name: Some("Desert Air LLC".to_string()),
            roc_license_number: Some("ROC-334455".to_string()),
            license_expiration_date: chrono::NaiveDate::from_ymd_opt(2027, 6, 30),
            owner_principal_name: Some("Sam Ortiz".to_string()),
            direct_cell: Some("602-555-0100".to_string()),
            business_email: Some("sam@desertair.test".to_string()),
            business_address: Some("1 Main St, Phoenix AZ".to_string()),
            commercial_crew_count: Some("1-2".to_string()),
            w9_url: Some("https://files.test/w9.pdf".to_string()),
            coi_url: Some("https://files.test/coi.pdf".to_string()),
            general_liability_coverage_amount: Some("$2,000,000".to_string()),
            workers_comp_policy_number: Some("WC-1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            new_contractor(submission.clone()),
            Err(AppError::BadRequest(_))
        ));

        let confirmed = RateCardSubmission {
            permit_responsibility_confirmed: true,
            inspection_responsibility_confirmed: true,
            rate_lock_confirmed: true,
            ..submission
        };
        let row = new_contractor(confirmed).unwrap();
        assert_eq!(row.roc_classification, "C-39");
        assert_eq!(row.agreement_token.len(), 64);
    }
}
