//! Relational store capability.
//!
//! Every flow talks to persistence through [`Store`]. The Postgres
//! implementation is used in production; the in-memory one backs tests and
//! honours the same conditional-update rules.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    AuditRecord, CadenceStage, Contractor, ContractorStatus, ContractorUpdate, Lead, NewContractor,
    NewLead, PublicAudit,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Upper bound on leads scanned per follow-up run.
pub const FOLLOWUP_BATCH_LIMIT: i64 = 500;

/// Current time at Postgres `timestamptz` precision, so a claim timestamp
/// read back from the store compares equal to the one that was written.
pub fn claim_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError>;

    /// Oldest-first page of leads still inside the cadence: an email on file,
    /// welcome sent, final reminder not yet sent.
    async fn list_leads_for_followup(&self, limit: i64) -> Result<Vec<Lead>, AppError>;

    /// Writes `at` into the stage column only if that column is null and the
    /// previous stage is set. Returns whether this call made the write.
    async fn claim_cadence_stage(
        &self,
        lead_id: Uuid,
        stage: CadenceStage,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Clears a claim made with `at`, provided the next stage is still unset.
    async fn release_cadence_stage(
        &self,
        lead_id: Uuid,
        stage: CadenceStage,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn insert_audit(&self, audit: &AuditRecord) -> Result<(), AppError>;

    /// Full record including the homeowner phone. Internal use only.
    async fn get_audit(&self, id: Uuid) -> Result<Option<AuditRecord>, AppError>;

    /// Restricted projection, resolved through `get_public_audit`.
    async fn get_public_audit(&self, secure_id: Uuid) -> Result<Option<PublicAudit>, AppError>;

    async fn insert_contractor(&self, contractor: &NewContractor) -> Result<Contractor, AppError>;

    async fn get_contractor(&self, id: Uuid) -> Result<Option<Contractor>, AppError>;

    async fn find_contractor_by_token(&self, token: &str) -> Result<Option<Contractor>, AppError>;

    /// Newest first.
    async fn list_contractors(&self) -> Result<Vec<Contractor>, AppError>;

    /// Contractors still `approved` (agreement never sent) whose approval is
    /// older than `approved_before`.
    async fn list_stalled_approvals(
        &self,
        approved_before: DateTime<Utc>,
    ) -> Result<Vec<Contractor>, AppError>;

    /// Applies `update` only while the row's status is one of `expected`.
    /// Returns whether the row was updated.
    async fn update_contractor(
        &self,
        id: Uuid,
        expected: &[ContractorStatus],
        update: &ContractorUpdate,
    ) -> Result<bool, AppError>;
}
