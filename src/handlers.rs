use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::analytics::Analytics;
use crate::audits::{public_audit_cache, AuditService};
use crate::authorization::AuthorizationService;
use crate::config::Config;
use crate::contractors::ContractorService;
use crate::errors::{require_fields, AppError};
use crate::followups::FollowupScheduler;
use crate::leads::{LeadService, WelcomeOutcome};
use crate::models::*;
use crate::notifier::Notifier;
use crate::security::{validate_admin_key, validate_cron_secret};
use crate::storage::DocumentStorage;
use crate::store::Store;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    pub leads: LeadService,
    pub audits: AuditService,
    pub authorization: AuthorizationService,
    pub contractors: ContractorService,
    pub followups: FollowupScheduler,
    /// Contractor document uploads. `None` when storage is not configured.
    pub documents: Option<DocumentStorage>,
}

impl AppState {
    /// Wires every flow to the same store and notifier.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        documents: Option<DocumentStorage>,
    ) -> Result<Self, AppError> {
        let config = Arc::new(config);
        let analytics = Analytics::new(config.analytics_webhook_url.clone())?;
        let contractors = ContractorService::new(store.clone(), notifier.clone(), config.clone());

        Ok(Self {
            leads: LeadService::new(store.clone(), notifier.clone(), analytics),
            audits: AuditService::new(store.clone(), config.clone(), public_audit_cache()),
            authorization: AuthorizationService::new(notifier.clone(), config.clone()),
            followups: FollowupScheduler::new(store, notifier, config.clone(), contractors.clone()),
            contractors,
            documents,
            config,
        })
    }

    fn require_admin(&self, headers: &HeaderMap) -> Result<(), AppError> {
        validate_admin_key(self.config.admin_api_key.as_deref(), headers)
    }
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid {}", field)))
}

/// Any route hit with the wrong HTTP method.
pub async fn method_not_allowed() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse {
            error: "Method not allowed".to_string(),
        }),
    )
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "atlas-intake-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/leads
///
/// Stores a homeowner lead. The welcome email is sent in the background.
#[utoipa::path(
    post,
    path = "/api/leads",
    request_body = LeadSubmission,
    responses(
        (status = 200, description = "Lead stored", body = LeadSubmitted),
        (status = 400, description = "Missing required fields", body = ErrorResponse),
        (status = 504, description = "Store did not answer in time", body = ErrorResponse)
    ),
    tag = "leads"
)]
pub async fn submit_lead(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LeadSubmission>, JsonRejection>,
) -> Result<Json<LeadSubmitted>, AppError> {
    let Json(submission) = payload?;
    let submitted = state.leads.submit_lead(submission).await?;

    Ok(Json(LeadSubmitted {
        ok: true,
        lead_id: submitted.lead.id,
    }))
}

/// POST /api/send-welcome
///
/// Idempotent welcome trigger; a second call for the same lead is a no-op.
#[utoipa::path(
    post,
    path = "/api/send-welcome",
    request_body = WelcomeRequest,
    responses(
        (status = 200, description = "Welcome sent or already sent", body = OkResponse),
        (status = 400, description = "Missing required fields", body = ErrorResponse),
        (status = 404, description = "Unknown lead", body = ErrorResponse),
        (status = 502, description = "Email provider failure", body = ErrorResponse)
    ),
    tag = "leads"
)]
pub async fn send_welcome(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WelcomeRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, AppError> {
    let Json(body) = payload?;
    require_fields(&[
        ("leadId", body.lead_id.as_deref()),
        ("name", body.name.as_deref()),
        ("email", body.email.as_deref()),
        ("projectType", body.project_type.as_deref()),
    ])?;
    let lead_id = parse_id(body.lead_id.as_deref().unwrap_or_default(), "leadId")?;

    match state.leads.send_welcome(lead_id).await? {
        WelcomeOutcome::Sent => tracing::info!("Welcome trigger sent email for {}", lead_id),
        WelcomeOutcome::AlreadySent => tracing::debug!("Welcome trigger no-op for {}", lead_id),
    }
    Ok(Json(OkResponse::ok()))
}

/// GET /api/send-followups
///
/// Periodic cadence job. Requires `Authorization: Bearer <CRON_SECRET>` when
/// the secret is configured.
#[utoipa::path(
    get,
    path = "/api/send-followups",
    responses(
        (status = 200, description = "Run summary", body = FollowupsRun),
        (status = 401, description = "Bad or missing cron secret", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "scheduler"
)]
pub async fn send_followups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<FollowupsRun>, AppError> {
    validate_cron_secret(state.config.cron_secret.as_deref(), &headers)?;
    let run = state.followups.run(Utc::now()).await?;
    Ok(Json(run))
}

/// POST /api/authorization-notify
///
/// Every field is optional; an empty body is accepted and defaulted.
#[utoipa::path(
    post,
    path = "/api/authorization-notify",
    request_body = AuthorizationRequest,
    responses(
        (status = 200, description = "Notice sent", body = AuthorizationAccepted),
        (status = 500, description = "AUTH_NOTIFY_EMAIL not configured", body = ErrorResponse)
    ),
    tag = "authorization"
)]
pub async fn authorization_notify(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AuthorizationAccepted>, AppError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        AuthorizationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };

    let accepted = state.authorization.submit_authorization(request).await?;
    Ok(Json(accepted))
}

/// GET /api/audits/{secure_id}
///
/// Public report read. Unknown and malformed ids are both not found.
#[utoipa::path(
    get,
    path = "/api/audits/{secure_id}",
    params(("secure_id" = String, Path, description = "Audit secure id")),
    responses(
        (status = 200, description = "Report without contact details", body = PublicAudit),
        (status = 404, description = "No such audit", body = ErrorResponse)
    ),
    tag = "audits"
)]
pub async fn get_public_audit(
    State(state): State<Arc<AppState>>,
    Path(secure_id): Path<String>,
) -> Result<Json<PublicAudit>, AppError> {
    let secure_id = Uuid::parse_str(secure_id.trim())
        .map_err(|_| AppError::NotFound("Audit not found".to_string()))?;
    let audit = state.audits.get_public_audit(secure_id).await?;
    Ok(Json(audit))
}

/// POST /api/internal/audits
#[utoipa::path(
    post,
    path = "/api/internal/audits",
    request_body = AuditDraft,
    responses(
        (status = 200, description = "Audit created", body = AuditCreated),
        (status = 400, description = "Missing required fields", body = ErrorResponse),
        (status = 401, description = "Admin key required", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "internal"
)]
pub async fn create_audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AuditDraft>, JsonRejection>,
) -> Result<Json<AuditCreated>, AppError> {
    state.require_admin(&headers)?;
    let Json(draft) = payload?;
    let created = state.audits.create_audit(draft).await?;
    Ok(Json(created))
}

/// GET /api/internal/audits/{id}
#[utoipa::path(
    get,
    path = "/api/internal/audits/{id}",
    params(("id" = String, Path, description = "Audit id")),
    responses(
        (status = 200, description = "Full audit record", body = AuditRecord),
        (status = 401, description = "Admin key required", body = ErrorResponse),
        (status = 404, description = "No such audit", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "internal"
)]
pub async fn get_internal_audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AuditRecord>, AppError> {
    state.require_admin(&headers)?;
    let id = parse_id(&id, "audit id")?;
    let audit = state.audits.get_audit(id).await?;
    Ok(Json(audit))
}

/// POST /api/contractors
///
/// Rate-card submission. The contractor starts at `pending_review`.
#[utoipa::path(
    post,
    path = "/api/contractors",
    request_body = RateCardSubmission,
    responses(
        (status = 200, description = "Rate card stored", body = ContractorSubmitted),
        (status = 400, description = "Missing required fields", body = ErrorResponse)
    ),
    tag = "contractors"
)]
pub async fn submit_rate_card(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RateCardSubmission>, JsonRejection>,
) -> Result<Json<ContractorSubmitted>, AppError> {
    let Json(submission) = payload?;
    let contractor = state.contractors.submit_rate_card(submission).await?;
    Ok(Json(ContractorSubmitted {
        ok: true,
        contractor_id: contractor.id,
    }))
}

/// POST /api/contractor-documents?folder=w9&filename=w9.pdf
///
/// Raw request body is stored as-is; the response carries its public URL.
#[utoipa::path(
    post,
    path = "/api/contractor-documents",
    params(
        ("folder" = String, Query, description = "One of w9, coi, agreements, submissions"),
        ("filename" = String, Query, description = "Original file name")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Stored", body = DocumentStored),
        (status = 400, description = "Bad folder, filename or empty body", body = ErrorResponse),
        (status = 500, description = "Storage not configured", body = ErrorResponse)
    ),
    tag = "contractors"
)]
pub async fn upload_contractor_document(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DocumentUploadQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DocumentStored>, AppError> {
    let Query(query) = query?;
    let documents = state.documents.as_ref().ok_or_else(|| {
        AppError::Configuration("Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY".to_string())
    })?;

    let folder = query
        .folder
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or("submissions");
    let filename = query.filename.as_deref().unwrap_or_default();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    let url = documents
        .upload(folder, filename, content_type, body)
        .await?;
    Ok(Json(DocumentStored { ok: true, url }))
}

/// GET /api/internal/contractors
#[utoipa::path(
    get,
    path = "/api/internal/contractors",
    responses(
        (status = 200, description = "Contractors, newest first", body = [ContractorSummary]),
        (status = 401, description = "Admin key required", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "internal"
)]
pub async fn list_contractors(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ContractorSummary>>, AppError> {
    state.require_admin(&headers)?;
    let contractors = state.contractors.list().await?;
    Ok(Json(contractors))
}

/// POST /api/internal/contractors/{id}/approve
///
/// Approves and sends the agreement in one step. If the send fails the
/// approval stands and the error is returned.
#[utoipa::path(
    post,
    path = "/api/internal/contractors/{id}/approve",
    params(("id" = String, Path, description = "Contractor id")),
    responses(
        (status = 200, description = "Approved and agreement sent", body = ContractorStatusChanged),
        (status = 401, description = "Admin key required", body = ErrorResponse),
        (status = 404, description = "No such contractor", body = ErrorResponse),
        (status = 409, description = "Illegal transition", body = ErrorResponse),
        (status = 502, description = "Agreement email failed; retried later", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "internal"
)]
pub async fn approve_contractor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ContractorStatusChanged>, AppError> {
    state.require_admin(&headers)?;
    let id = parse_id(&id, "contractor id")?;
    let changed = state.contractors.approve(id).await?;
    Ok(Json(changed))
}

/// POST /api/internal/contractors/{id}/reject
#[utoipa::path(
    post,
    path = "/api/internal/contractors/{id}/reject",
    params(("id" = String, Path, description = "Contractor id")),
    responses(
        (status = 200, description = "Rejected", body = ContractorStatusChanged),
        (status = 401, description = "Admin key required", body = ErrorResponse),
        (status = 404, description = "No such contractor", body = ErrorResponse),
        (status = 409, description = "Contractor is already an active partner", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "internal"
)]
pub async fn reject_contractor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ContractorStatusChanged>, AppError> {
    state.require_admin(&headers)?;
    let id = parse_id(&id, "contractor id")?;
    let changed = state.contractors.reject(id).await?;
    Ok(Json(changed))
}

/// POST /api/contractor-send-agreement
#[utoipa::path(
    post,
    path = "/api/contractor-send-agreement",
    request_body = SendAgreementRequest,
    responses(
        (status = 200, description = "Agreement emailed", body = AgreementDispatched),
        (status = 400, description = "Missing contractorId", body = ErrorResponse),
        (status = 401, description = "Admin key required", body = ErrorResponse),
        (status = 404, description = "No such contractor", body = ErrorResponse),
        (status = 409, description = "Contractor is not approved", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "internal"
)]
pub async fn send_agreement(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SendAgreementRequest>, JsonRejection>,
) -> Result<Json<AgreementDispatched>, AppError> {
    state.require_admin(&headers)?;
    let Json(body) = payload?;
    require_fields(&[("contractorId", body.contractor_id.as_deref())])?;
    let id = parse_id(body.contractor_id.as_deref().unwrap_or_default(), "contractorId")?;

    let dispatched = state.contractors.send_agreement(id).await?;
    Ok(Json(dispatched))
}

/// GET /api/contractor-agreement-load?token=...
#[utoipa::path(
    get,
    path = "/api/contractor-agreement-load",
    params(("token" = String, Query, description = "Agreement token from the emailed link")),
    responses(
        (status = 200, description = "Open agreement", body = AgreementLoaded),
        (status = 400, description = "Missing token", body = ErrorResponse),
        (status = 404, description = "Unknown, used or unsent token", body = ErrorResponse)
    ),
    tag = "contractors"
)]
pub async fn load_agreement(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TokenQuery>, QueryRejection>,
) -> Result<Json<AgreementLoaded>, AppError> {
    let Query(query) = query?;
    let contractor = state.contractors.load_agreement(query.token.as_deref()).await?;
    Ok(Json(AgreementLoaded {
        ok: true,
        contractor,
    }))
}

/// POST /api/contractor-agreement-submit
#[utoipa::path(
    post,
    path = "/api/contractor-agreement-submit",
    request_body = AgreementSubmission,
    responses(
        (status = 200, description = "Agreement recorded", body = AgreementSigned),
        (status = 400, description = "Missing required fields", body = ErrorResponse),
        (status = 404, description = "Unknown, used or unsent token", body = ErrorResponse)
    ),
    tag = "contractors"
)]
pub async fn submit_agreement(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AgreementSubmission>, JsonRejection>,
) -> Result<Json<AgreementSigned>, AppError> {
    let Json(submission) = payload?;
    let signed = state.contractors.submit_agreement(submission).await?;
    Ok(Json(signed))
}
