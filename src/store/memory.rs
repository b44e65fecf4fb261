use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Store;
use crate::errors::AppError;
use crate::models::{
    AuditRecord, CadenceStage, Contractor, ContractorStatus, ContractorUpdate, Lead, NewContractor,
    NewLead, PublicAudit,
};

/// In-process store with the same conditional-write rules as Postgres.
#[derive(Default)]
pub struct MemoryStore {
    pub leads: Mutex<Vec<Lead>>,
    pub audits: Mutex<HashMap<Uuid, AuditRecord>>,
    pub contractors: Mutex<Vec<Contractor>>,
    /// Number of successful cadence claims, per stage column.
    pub cadence_writes: Mutex<HashMap<&'static str, u64>>,
    pub public_audit_reads: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a stored lead, for tests that need to age timestamps.
    pub async fn put_lead(&self, lead: Lead) {
        let mut leads = self.leads.lock().await;
        match leads.iter_mut().find(|l| l.id == lead.id) {
            Some(existing) => *existing = lead,
            None => leads.push(lead),
        }
    }

    pub async fn cadence_write_count(&self, stage: CadenceStage) -> u64 {
        self.cadence_writes
            .lock()
            .await
            .get(stage.column())
            .copied()
            .unwrap_or(0)
    }

    pub async fn put_contractor(&self, contractor: Contractor) {
        let mut contractors = self.contractors.lock().await;
        match contractors.iter_mut().find(|c| c.id == contractor.id) {
            Some(existing) => *existing = contractor,
            None => contractors.push(contractor),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let row = Lead {
            id: Uuid::new_v4(),
            name: lead.name.clone(),
            phone: lead.phone.clone(),
            email: lead.email.clone(),
            zip_code: lead.zip_code.clone(),
            project_type: lead.project_type.clone(),
            contractor_name: lead.contractor_name.clone(),
            notes: lead.notes.clone(),
            submitted_at: Utc::now(),
            welcome_sent_at: None,
            followup_1_sent_at: None,
            followup_2_sent_at: None,
        };
        self.leads.lock().await.push(row.clone());
        Ok(row)
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        Ok(self.leads.lock().await.iter().find(|l| l.id == id).cloned())
    }

    async fn list_leads_for_followup(&self, limit: i64) -> Result<Vec<Lead>, AppError> {
        let mut leads: Vec<Lead> = self
            .leads
            .lock()
            .await
            .iter()
            .filter(|l| !l.email.is_empty())
            .filter(|l| l.welcome_sent_at.is_some() && l.followup_2_sent_at.is_none())
            .cloned()
            .collect();
        leads.sort_by_key(|l| l.submitted_at);
        leads.truncate(limit.max(0) as usize);
        Ok(leads)
    }

    async fn claim_cadence_stage(
        &self,
        lead_id: Uuid,
        stage: CadenceStage,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut leads = self.leads.lock().await;
        let Some(lead) = leads.iter_mut().find(|l| l.id == lead_id) else {
            return Ok(false);
        };

        let previous_ready = stage
            .previous()
            .map(|prev| lead.stage_sent_at(prev).is_some())
            .unwrap_or(true);
        if lead.stage_sent_at(stage).is_some() || !previous_ready {
            return Ok(false);
        }

        lead.set_stage_sent_at(stage, Some(at));
        drop(leads);

        *self
            .cadence_writes
            .lock()
            .await
            .entry(stage.column())
            .or_insert(0) += 1;
        Ok(true)
    }

    async fn release_cadence_stage(
        &self,
        lead_id: Uuid,
        stage: CadenceStage,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut leads = self.leads.lock().await;
        if let Some(lead) = leads.iter_mut().find(|l| l.id == lead_id) {
            let next_clear = stage
                .next()
                .map(|next| lead.stage_sent_at(next).is_none())
                .unwrap_or(true);
            if lead.stage_sent_at(stage) == Some(at) && next_clear {
                lead.set_stage_sent_at(stage, None);
            }
        }
        Ok(())
    }

    async fn insert_audit(&self, audit: &AuditRecord) -> Result<(), AppError> {
        let mut audits = self.audits.lock().await;
        if audits.contains_key(&audit.id) {
            return Err(AppError::Conflict(format!("Audit {} already exists", audit.id)));
        }
        audits.insert(audit.id, audit.clone());
        Ok(())
    }

    async fn get_audit(&self, id: Uuid) -> Result<Option<AuditRecord>, AppError> {
        Ok(self.audits.lock().await.get(&id).cloned())
    }

    async fn get_public_audit(&self, secure_id: Uuid) -> Result<Option<PublicAudit>, AppError> {
        self.public_audit_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .audits
            .lock()
            .await
            .get(&secure_id)
            .cloned()
            .map(PublicAudit::from))
    }

    async fn insert_contractor(&self, c: &NewContractor) -> Result<Contractor, AppError> {
        let now = Utc::now();
        let mut contractors = self.contractors.lock().await;
        if contractors
            .iter()
            .any(|existing| existing.agreement_token == c.agreement_token)
        {
            return Err(AppError::Conflict("Agreement token collision".to_string()));
        }

        let row = Contractor {
            id: Uuid::new_v4(),
            created_at: now,
            legal_entity_name: c.legal_entity_name.clone(),
            dba: c.dba.clone(),
            roc_license_number: c.roc_license_number.clone(),
            roc_classification: c.roc_classification.clone(),
            license_expiration_date: c.license_expiration_date,
            owner_principal_name: c.owner_principal_name.clone(),
            direct_cell: c.direct_cell.clone(),
            business_email: c.business_email.clone(),
            business_address: c.business_address.clone(),
            years_in_business: c.years_in_business,
            commercial_crew_count: c.commercial_crew_count.clone(),
            residential_crew_count: c.residential_crew_count,
            average_weekly_install_capacity: c.average_weekly_install_capacity,
            current_backlog_weeks: c.current_backlog_weeks,
            w9_url: c.w9_url.clone(),
            coi_url: c.coi_url.clone(),
            general_liability_coverage_amount: c.general_liability_coverage_amount.clone(),
            workers_comp_policy_number: c.workers_comp_policy_number.clone(),
            bonding_capacity: c.bonding_capacity.clone(),
            service_capabilities: c.service_capabilities.clone(),
            execution_rate_card: c.execution_rate_card.clone(),
            permit_responsibility_confirmed: c.permit_responsibility_confirmed,
            inspection_responsibility_confirmed: c.inspection_responsibility_confirmed,
            rate_lock_confirmed: c.rate_lock_confirmed,
            agreement_token: c.agreement_token.clone(),
            status: ContractorStatus::PendingReview,
            rate_submitted_at: now,
            approved_at: None,
            agreement_sent_at: None,
            agreement_signer_name: None,
            agreement_signer_title: None,
            agreement_signed_pdf_url: None,
            agreement_signed_at: None,
        };
        contractors.push(row.clone());
        Ok(row)
    }

    async fn get_contractor(&self, id: Uuid) -> Result<Option<Contractor>, AppError> {
        Ok(self
            .contractors
            .lock()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_contractor_by_token(&self, token: &str) -> Result<Option<Contractor>, AppError> {
        Ok(self
            .contractors
            .lock()
            .await
            .iter()
            .find(|c| c.agreement_token == token)
            .cloned())
    }

    async fn list_contractors(&self) -> Result<Vec<Contractor>, AppError> {
        let mut contractors = self.contractors.lock().await.clone();
        contractors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(contractors)
    }

    async fn list_stalled_approvals(
        &self,
        approved_before: DateTime<Utc>,
    ) -> Result<Vec<Contractor>, AppError> {
        let mut stalled: Vec<Contractor> = self
            .contractors
            .lock()
            .await
            .iter()
            .filter(|c| c.status == ContractorStatus::Approved)
            .filter(|c| c.approved_at.map(|at| at < approved_before).unwrap_or(false))
            .cloned()
            .collect();
        stalled.sort_by_key(|c| c.approved_at);
        Ok(stalled)
    }

    async fn update_contractor(
        &self,
        id: Uuid,
        expected: &[ContractorStatus],
        update: &ContractorUpdate,
    ) -> Result<bool, AppError> {
        let mut contractors = self.contractors.lock().await;
        match contractors.iter_mut().find(|c| c.id == id) {
            Some(contractor) if expected.contains(&contractor.status) => {
                update.apply_to(contractor);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
