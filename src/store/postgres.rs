use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::Store;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    AuditRecord, CadenceStage, Contractor, ContractorStatus, ContractorUpdate, Lead, NewContractor,
    NewLead, PublicAudit,
};

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a failed write to the category an operator can act on: bad
/// credentials or schema, a grant/row-level-security refusal, or anything else.
fn classify_write_error(operation: &str, err: sqlx::Error) -> AppError {
    let code = match &err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    };

    match code.as_deref() {
        Some("42501") => AppError::PermissionDenied(format!(
            "{}: the store denied the write; check table grants and row-level security policies",
            operation
        )),
        Some("42P01") | Some("42703") => AppError::Configuration(format!(
            "{}: table or column missing; apply the migrations",
            operation
        )),
        _ if matches!(err, sqlx::Error::Configuration(_)) => AppError::Configuration(format!(
            "{}: store connection is misconfigured ({})",
            operation, err
        )),
        _ => AppError::WithContext {
            source: Box::new(AppError::DatabaseError(err)),
            context: operation.to_string(),
        },
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (id, name, phone, email, zip_code, project_type, contractor_name, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&lead.name)
        .bind(&lead.phone)
        .bind(&lead.email)
        .bind(&lead.zip_code)
        .bind(&lead.project_type)
        .bind(&lead.contractor_name)
        .bind(&lead.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_write_error("Failed to save lead", e))
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load lead")
    }

    async fn list_leads_for_followup(&self, limit: i64) -> Result<Vec<Lead>, AppError> {
        sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE email <> ''
              AND welcome_sent_at IS NOT NULL
              AND followup_2_sent_at IS NULL
            ORDER BY submitted_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load leads for follow-up")
    }

    async fn claim_cadence_stage(
        &self,
        lead_id: Uuid,
        stage: CadenceStage,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Column names come from a closed enum, never from input.
        let precondition = stage
            .previous()
            .map(|prev| format!(" AND {} IS NOT NULL", prev.column()))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE leads SET {col} = $1 WHERE id = $2 AND {col} IS NULL{precondition}",
            col = stage.column(),
            precondition = precondition
        );

        let result = sqlx::query(&sql)
            .bind(at)
            .bind(lead_id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error("Failed to record email cadence", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_cadence_stage(
        &self,
        lead_id: Uuid,
        stage: CadenceStage,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let guard = stage
            .next()
            .map(|next| format!(" AND {} IS NULL", next.column()))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE leads SET {col} = NULL WHERE id = $1 AND {col} = $2{guard}",
            col = stage.column(),
            guard = guard
        );

        let result = sqlx::query(&sql)
            .bind(lead_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("Failed to release email cadence claim")?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                "No cadence claim to release: lead_id={}, stage={}",
                lead_id,
                stage.column()
            );
        }

        Ok(())
    }

    async fn insert_audit(&self, audit: &AuditRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audits (
                id, created_at, homeowner_name, homeowner_phone, industry, zip,
                permit_issued_date, permitted_valuation, market_median, deviation_percent,
                pricing_signal, findings, what_this_means, recommended_actions
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(audit.id)
        .bind(audit.created_at)
        .bind(&audit.homeowner_name)
        .bind(&audit.homeowner_phone)
        .bind(&audit.industry)
        .bind(&audit.zip)
        .bind(audit.permit_issued_date)
        .bind(audit.permitted_valuation)
        .bind(audit.market_median)
        .bind(audit.deviation_percent)
        .bind(audit.pricing_signal.as_str())
        .bind(&audit.findings)
        .bind(&audit.what_this_means)
        .bind(&audit.recommended_actions)
        .execute(&self.pool)
        .await
        .map_err(|e| classify_write_error("Failed to save audit", e))?;

        tracing::debug!("Stored audit {}", audit.id);
        Ok(())
    }

    async fn get_audit(&self, id: Uuid) -> Result<Option<AuditRecord>, AppError> {
        sqlx::query_as::<_, AuditRecord>("SELECT * FROM audits WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load audit")
    }

    async fn get_public_audit(&self, secure_id: Uuid) -> Result<Option<PublicAudit>, AppError> {
        sqlx::query_as::<_, PublicAudit>("SELECT * FROM get_public_audit($1)")
            .bind(secure_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load audit report")
    }

    async fn insert_contractor(&self, c: &NewContractor) -> Result<Contractor, AppError> {
        sqlx::query_as::<_, Contractor>(
            r#"
            INSERT INTO contractors (
                id, legal_entity_name, dba, roc_license_number, roc_classification,
                license_expiration_date, owner_principal_name, direct_cell, business_email,
                business_address, years_in_business, commercial_crew_count, residential_crew_count,
                average_weekly_install_capacity, current_backlog_weeks, w9_url, coi_url,
                general_liability_coverage_amount, workers_comp_policy_number, bonding_capacity,
                service_capabilities, execution_rate_card, permit_responsibility_confirmed,
                inspection_responsibility_confirmed, rate_lock_confirmed, agreement_token, status
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
            )
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&c.legal_entity_name)
        .bind(&c.dba)
        .bind(&c.roc_license_number)
        .bind(&c.roc_classification)
        .bind(c.license_expiration_date)
        .bind(&c.owner_principal_name)
        .bind(&c.direct_cell)
        .bind(&c.business_email)
        .bind(&c.business_address)
        .bind(c.years_in_business)
        .bind(&c.commercial_crew_count)
        .bind(c.residential_crew_count)
        .bind(c.average_weekly_install_capacity)
        .bind(c.current_backlog_weeks)
        .bind(&c.w9_url)
        .bind(&c.coi_url)
        .bind(&c.general_liability_coverage_amount)
        .bind(&c.workers_comp_policy_number)
        .bind(&c.bonding_capacity)
        .bind(&c.service_capabilities)
        .bind(&c.execution_rate_card)
        .bind(c.permit_responsibility_confirmed)
        .bind(c.inspection_responsibility_confirmed)
        .bind(c.rate_lock_confirmed)
        .bind(&c.agreement_token)
        .bind(ContractorStatus::PendingReview.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_write_error("Failed to submit rate card", e))
    }

    async fn get_contractor(&self, id: Uuid) -> Result<Option<Contractor>, AppError> {
        sqlx::query_as::<_, Contractor>("SELECT * FROM contractors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load contractor")
    }

    async fn find_contractor_by_token(&self, token: &str) -> Result<Option<Contractor>, AppError> {
        sqlx::query_as::<_, Contractor>("SELECT * FROM contractors WHERE agreement_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load agreement")
    }

    async fn list_contractors(&self) -> Result<Vec<Contractor>, AppError> {
        sqlx::query_as::<_, Contractor>("SELECT * FROM contractors ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load contractors")
    }

    async fn list_stalled_approvals(
        &self,
        approved_before: DateTime<Utc>,
    ) -> Result<Vec<Contractor>, AppError> {
        sqlx::query_as::<_, Contractor>(
            r#"
            SELECT * FROM contractors
            WHERE status = $1 AND approved_at < $2
            ORDER BY approved_at ASC
            "#,
        )
        .bind(ContractorStatus::Approved.as_str())
        .bind(approved_before)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load pending agreements")
    }

    async fn update_contractor(
        &self,
        id: Uuid,
        expected: &[ContractorStatus],
        update: &ContractorUpdate,
    ) -> Result<bool, AppError> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let status = update.target_status().as_str();

        let query = match update {
            ContractorUpdate::Approve { at } => sqlx::query(
                "UPDATE contractors SET status = $1, approved_at = $4 \
                 WHERE id = $2 AND status = ANY($3)",
            )
            .bind(status)
            .bind(id)
            .bind(expected)
            .bind(*at),
            ContractorUpdate::MarkAgreementSent { at } => sqlx::query(
                "UPDATE contractors SET status = $1, agreement_sent_at = $4 \
                 WHERE id = $2 AND status = ANY($3)",
            )
            .bind(status)
            .bind(id)
            .bind(expected)
            .bind(*at),
            ContractorUpdate::RevertAgreementSent { previous_sent_at } => sqlx::query(
                "UPDATE contractors SET status = $1, agreement_sent_at = $4 \
                 WHERE id = $2 AND status = ANY($3)",
            )
            .bind(status)
            .bind(id)
            .bind(expected)
            .bind(*previous_sent_at),
            ContractorUpdate::Sign {
                signer_name,
                signer_title,
                signed_pdf_url,
                at,
            } => sqlx::query(
                "UPDATE contractors SET status = $1, agreement_signer_name = $4, \
                 agreement_signer_title = $5, agreement_signed_pdf_url = $6, \
                 agreement_signed_at = $7 \
                 WHERE id = $2 AND status = ANY($3)",
            )
            .bind(status)
            .bind(id)
            .bind(expected)
            .bind(signer_name.clone())
            .bind(signer_title.clone())
            .bind(signed_pdf_url.clone())
            .bind(*at),
            ContractorUpdate::Reject => sqlx::query(
                "UPDATE contractors SET status = $1 WHERE id = $2 AND status = ANY($3)",
            )
            .bind(status)
            .bind(id)
            .bind(expected),
        };

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error("Failed to update contractor status", e))?;

        Ok(result.rows_affected() == 1)
    }
}
