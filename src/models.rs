use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

// ============ Leads ============

/// A homeowner's submitted interest record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub zip_code: String,
    pub project_type: String,
    pub contractor_name: Option<String>,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub welcome_sent_at: Option<DateTime<Utc>>,
    pub followup_1_sent_at: Option<DateTime<Utc>>,
    pub followup_2_sent_at: Option<DateTime<Utc>>,
}

/// Validated lead fields ready to insert.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub zip_code: String,
    pub project_type: String,
    pub contractor_name: Option<String>,
    pub notes: Option<String>,
}

/// Raw lead form body. Every field is optional here so missing values can be
/// reported by name instead of as a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub zip_code: Option<String>,
    pub project_type: Option<String>,
    pub contractor_name: Option<String>,
    pub notes: Option<String>,
}

/// The email cadence stages, in the order they must be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceStage {
    Welcome,
    FollowUp1,
    FollowUp2,
}

impl CadenceStage {
    /// Column holding this stage's timestamp.
    pub fn column(self) -> &'static str {
        match self {
            CadenceStage::Welcome => "welcome_sent_at",
            CadenceStage::FollowUp1 => "followup_1_sent_at",
            CadenceStage::FollowUp2 => "followup_2_sent_at",
        }
    }

    /// The stage that must already be set before this one may be written.
    pub fn previous(self) -> Option<CadenceStage> {
        match self {
            CadenceStage::Welcome => None,
            CadenceStage::FollowUp1 => Some(CadenceStage::Welcome),
            CadenceStage::FollowUp2 => Some(CadenceStage::FollowUp1),
        }
    }

    /// The stage that must still be unset for this one to be released.
    pub fn next(self) -> Option<CadenceStage> {
        match self {
            CadenceStage::Welcome => Some(CadenceStage::FollowUp1),
            CadenceStage::FollowUp1 => Some(CadenceStage::FollowUp2),
            CadenceStage::FollowUp2 => None,
        }
    }
}

impl Lead {
    pub fn stage_sent_at(&self, stage: CadenceStage) -> Option<DateTime<Utc>> {
        match stage {
            CadenceStage::Welcome => self.welcome_sent_at,
            CadenceStage::FollowUp1 => self.followup_1_sent_at,
            CadenceStage::FollowUp2 => self.followup_2_sent_at,
        }
    }

    pub fn set_stage_sent_at(&mut self, stage: CadenceStage, at: Option<DateTime<Utc>>) {
        match stage {
            CadenceStage::Welcome => self.welcome_sent_at = at,
            CadenceStage::FollowUp1 => self.followup_1_sent_at = at,
            CadenceStage::FollowUp2 => self.followup_2_sent_at = at,
        }
    }
}

// ============ Audits ============

/// Coarse pricing verdict derived from the valuation ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PricingSignal {
    Green,
    Yellow,
    Red,
}

impl PricingSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            PricingSignal::Green => "green",
            PricingSignal::Yellow => "yellow",
            PricingSignal::Red => "red",
        }
    }
}

impl fmt::Display for PricingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingSignal {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(PricingSignal::Green),
            "yellow" => Ok(PricingSignal::Yellow),
            "red" => Ok(PricingSignal::Red),
            other => Err(AppError::InternalError(format!(
                "Unknown pricing signal '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for PricingSignal {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Full audit record, as seen by analysts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub homeowner_name: String,
    pub homeowner_phone: Option<String>,
    pub industry: String,
    pub zip: String,
    pub permit_issued_date: NaiveDate,
    pub permitted_valuation: f64,
    pub market_median: f64,
    pub deviation_percent: i32,
    #[sqlx(try_from = "String")]
    pub pricing_signal: PricingSignal,
    pub findings: Vec<String>,
    pub what_this_means: String,
    pub recommended_actions: Vec<String>,
}

/// Restricted projection served to unauthenticated report viewers.
/// Carries no phone number.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicAudit {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub homeowner_name: String,
    pub industry: String,
    pub zip: String,
    pub permit_issued_date: NaiveDate,
    pub permitted_valuation: f64,
    pub market_median: f64,
    pub deviation_percent: i32,
    #[sqlx(try_from = "String")]
    pub pricing_signal: PricingSignal,
    pub findings: Vec<String>,
    pub what_this_means: String,
    pub recommended_actions: Vec<String>,
}

impl From<AuditRecord> for PublicAudit {
    fn from(audit: AuditRecord) -> Self {
        Self {
            id: audit.id,
            created_at: audit.created_at,
            homeowner_name: audit.homeowner_name,
            industry: audit.industry,
            zip: audit.zip,
            permit_issued_date: audit.permit_issued_date,
            permitted_valuation: audit.permitted_valuation,
            market_median: audit.market_median,
            deviation_percent: audit.deviation_percent,
            pricing_signal: audit.pricing_signal,
            findings: audit.findings,
            what_this_means: audit.what_this_means,
            recommended_actions: audit.recommended_actions,
        }
    }
}

/// Analyst input for the audit generator.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditDraft {
    pub homeowner_name: Option<String>,
    pub homeowner_phone: Option<String>,
    /// Defaults to `HVAC`.
    pub industry: Option<String>,
    pub zip: Option<String>,
    /// Defaults to today (UTC).
    pub permit_issued_date: Option<NaiveDate>,
    pub permitted_valuation: Option<f64>,
    pub market_median: Option<f64>,
    /// One finding per line; blank lines are dropped.
    pub findings: Option<String>,
    /// Left blank to use the default narrative for the computed signal.
    pub what_this_means: Option<String>,
}

// ============ Contractors ============

/// Partner onboarding status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContractorStatus {
    PendingReview,
    Approved,
    AgreementSent,
    ActivePartner,
    Rejected,
}

impl ContractorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContractorStatus::PendingReview => "pending_review",
            ContractorStatus::Approved => "approved",
            ContractorStatus::AgreementSent => "agreement_sent",
            ContractorStatus::ActivePartner => "active_partner",
            ContractorStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ContractorStatus::ActivePartner | ContractorStatus::Rejected
        )
    }
}

impl fmt::Display for ContractorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractorStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(ContractorStatus::PendingReview),
            "approved" => Ok(ContractorStatus::Approved),
            "agreement_sent" => Ok(ContractorStatus::AgreementSent),
            "active_partner" => Ok(ContractorStatus::ActivePartner),
            "rejected" => Ok(ContractorStatus::Rejected),
            other => Err(AppError::InternalError(format!(
                "Unknown contractor status '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ContractorStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A contractor partner row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contractor {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub legal_entity_name: String,
    pub dba: Option<String>,
    pub roc_license_number: String,
    pub roc_classification: String,
    pub license_expiration_date: NaiveDate,
    pub owner_principal_name: String,
    pub direct_cell: String,
    pub business_email: String,
    pub business_address: String,
    pub years_in_business: i32,
    pub commercial_crew_count: String,
    pub residential_crew_count: i32,
    pub average_weekly_install_capacity: i32,
    pub current_backlog_weeks: i32,
    pub w9_url: String,
    pub coi_url: String,
    pub general_liability_coverage_amount: String,
    pub workers_comp_policy_number: String,
    pub bonding_capacity: Option<String>,
    #[schema(value_type = Object)]
    pub service_capabilities: serde_json::Value,
    #[schema(value_type = Object)]
    pub execution_rate_card: serde_json::Value,
    pub permit_responsibility_confirmed: bool,
    pub inspection_responsibility_confirmed: bool,
    pub rate_lock_confirmed: bool,
    /// Never serialized: it is a bearer credential.
    #[serde(skip_serializing, default)]
    pub agreement_token: String,
    #[sqlx(try_from = "String")]
    pub status: ContractorStatus,
    pub rate_submitted_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub agreement_sent_at: Option<DateTime<Utc>>,
    pub agreement_signer_name: Option<String>,
    pub agreement_signer_title: Option<String>,
    pub agreement_signed_pdf_url: Option<String>,
    pub agreement_signed_at: Option<DateTime<Utc>>,
}

/// Row shown on the internal partner review list.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractorSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: ContractorStatus,
    pub legal_entity_name: String,
    pub roc_license_number: String,
    pub owner_principal_name: String,
    pub direct_cell: String,
    pub business_email: String,
    pub business_address: String,
}

impl From<&Contractor> for ContractorSummary {
    fn from(c: &Contractor) -> Self {
        Self {
            id: c.id,
            created_at: c.created_at,
            status: c.status,
            legal_entity_name: c.legal_entity_name.clone(),
            roc_license_number: c.roc_license_number.clone(),
            owner_principal_name: c.owner_principal_name.clone(),
            direct_cell: c.direct_cell.clone(),
            business_email: c.business_email.clone(),
            business_address: c.business_address.clone(),
        }
    }
}

/// What a contractor sees when opening their agreement link.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgreementView {
    pub id: Uuid,
    pub legal_entity_name: String,
    pub roc_license_number: String,
    pub owner_principal_name: String,
    pub direct_cell: String,
    pub business_email: String,
    pub business_address: String,
    pub rate_submitted_at: DateTime<Utc>,
    pub status: ContractorStatus,
}

impl From<&Contractor> for AgreementView {
    fn from(c: &Contractor) -> Self {
        Self {
            id: c.id,
            legal_entity_name: c.legal_entity_name.clone(),
            roc_license_number: c.roc_license_number.clone(),
            owner_principal_name: c.owner_principal_name.clone(),
            direct_cell: c.direct_cell.clone(),
            business_email: c.business_email.clone(),
            business_address: c.business_address.clone(),
            rate_submitted_at: c.rate_submitted_at,
            status: c.status,
        }
    }
}

/// Rate-card form body.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateCardSubmission {
    pub legal_entity_name: Option<String>,
    pub dba: Option<String>,
    pub roc_license_number: Option<String>,
    /// Defaults to `C-39`.
    pub roc_classification: Option<String>,
    pub license_expiration_date: Option<NaiveDate>,
    pub owner_principal_name: Option<String>,
    pub direct_cell: Option<String>,
    pub business_email: Option<String>,
    pub business_address: Option<String>,
    #[serde(default)]
    pub years_in_business: i32,
    pub commercial_crew_count: Option<String>,
    #[serde(default)]
    pub residential_crew_count: i32,
    #[serde(default)]
    pub average_weekly_install_capacity: i32,
    #[serde(default)]
    pub current_backlog_weeks: i32,
    pub w9_url: Option<String>,
    pub coi_url: Option<String>,
    pub general_liability_coverage_amount: Option<String>,
    pub workers_comp_policy_number: Option<String>,
    pub bonding_capacity: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub service_capabilities: serde_json::Value,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub execution_rate_card: serde_json::Value,
    #[serde(default)]
    pub permit_responsibility_confirmed: bool,
    #[serde(default)]
    pub inspection_responsibility_confirmed: bool,
    #[serde(default)]
    pub rate_lock_confirmed: bool,
}

/// Validated contractor fields ready to insert at `pending_review`.
#[derive(Debug, Clone)]
pub struct NewContractor {
    pub legal_entity_name: String,
    pub dba: Option<String>,
    pub roc_license_number: String,
    pub roc_classification: String,
    pub license_expiration_date: NaiveDate,
    pub owner_principal_name: String,
    pub direct_cell: String,
    pub business_email: String,
    pub business_address: String,
    pub years_in_business: i32,
    pub commercial_crew_count: String,
    pub residential_crew_count: i32,
    pub average_weekly_install_capacity: i32,
    pub current_backlog_weeks: i32,
    pub w9_url: String,
    pub coi_url: String,
    pub general_liability_coverage_amount: String,
    pub workers_comp_policy_number: String,
    pub bonding_capacity: Option<String>,
    pub service_capabilities: serde_json::Value,
    pub execution_rate_card: serde_json::Value,
    pub permit_responsibility_confirmed: bool,
    pub inspection_responsibility_confirmed: bool,
    pub rate_lock_confirmed: bool,
    pub agreement_token: String,
}

/// A status write, applied only when the row is in one of the expected states.
#[derive(Debug, Clone)]
pub enum ContractorUpdate {
    Approve {
        at: DateTime<Utc>,
    },
    MarkAgreementSent {
        at: DateTime<Utc>,
    },
    /// Undo a first agreement send whose email never went out.
    RevertAgreementSent {
        previous_sent_at: Option<DateTime<Utc>>,
    },
    Sign {
        signer_name: String,
        signer_title: String,
        signed_pdf_url: String,
        at: DateTime<Utc>,
    },
    Reject,
}

impl ContractorUpdate {
    pub fn target_status(&self) -> ContractorStatus {
        match self {
            ContractorUpdate::Approve { .. } => ContractorStatus::Approved,
            ContractorUpdate::MarkAgreementSent { .. } => ContractorStatus::AgreementSent,
            ContractorUpdate::RevertAgreementSent { .. } => ContractorStatus::Approved,
            ContractorUpdate::Sign { .. } => ContractorStatus::ActivePartner,
            ContractorUpdate::Reject => ContractorStatus::Rejected,
        }
    }

    /// Applies the write to an in-memory row.
    pub fn apply_to(&self, contractor: &mut Contractor) {
        contractor.status = self.target_status();
        match self {
            ContractorUpdate::Approve { at } => contractor.approved_at = Some(*at),
            ContractorUpdate::MarkAgreementSent { at } => {
                contractor.agreement_sent_at = Some(*at)
            }
            ContractorUpdate::RevertAgreementSent { previous_sent_at } => {
                contractor.agreement_sent_at = *previous_sent_at
            }
            ContractorUpdate::Sign {
                signer_name,
                signer_title,
                signed_pdf_url,
                at,
            } => {
                contractor.agreement_signer_name = Some(signer_name.clone());
                contractor.agreement_signer_title = Some(signer_title.clone());
                contractor.agreement_signed_pdf_url = Some(signed_pdf_url.clone());
                contractor.agreement_signed_at = Some(*at);
            }
            ContractorUpdate::Reject => {}
        }
    }
}

// ============ Authorization ============

/// Homeowner authorization confirmation. Every field falls back to a default.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub permit_id: Option<String>,
    pub property_address: Option<String>,
    pub project_type: Option<String>,
    pub homeowner_name: Option<String>,
    pub homeowner_email: Option<String>,
    pub current_valuation: Option<f64>,
    pub authorized_rate: Option<f64>,
    pub signed_pdf_url: Option<String>,
}

// ============ Request / response bodies ============

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeRequest {
    pub lead_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendAgreementRequest {
    pub contractor_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgreementSubmission {
    pub token: Option<String>,
    pub signer_name: Option<String>,
    pub signer_title: Option<String>,
    pub signed_pdf_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentUploadQuery {
    pub folder: Option<String>,
    pub filename: Option<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmitted {
    pub ok: bool,
    pub lead_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditCreated {
    pub ok: bool,
    pub audit: AuditRecord,
    pub report_url: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationAccepted {
    pub ok: bool,
    pub savings: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractorSubmitted {
    pub ok: bool,
    pub contractor_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgreementLoaded {
    pub ok: bool,
    pub contractor: AgreementView,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgreementSigned {
    pub ok: bool,
    /// False when the agreement was recorded but a confirmation email failed.
    pub confirmation_emailed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgreementDispatched {
    pub ok: bool,
    pub agreement_link: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractorStatusChanged {
    pub ok: bool,
    pub status: ContractorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FollowupsRun {
    pub ok: bool,
    pub followup1_sent: usize,
    pub followup2_sent: usize,
    pub failed: usize,
    pub agreements_retried: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentStored {
    pub ok: bool,
    pub url: String,
}
