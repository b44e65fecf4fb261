use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Atlas Intake API",
        description = "Lead intake, audit reports, homeowner authorizations and contractor onboarding."
    ),
    paths(
        handlers::submit_lead,
        handlers::send_welcome,
        handlers::send_followups,
        handlers::authorization_notify,
        handlers::get_public_audit,
        handlers::create_audit,
        handlers::get_internal_audit,
        handlers::submit_rate_card,
        handlers::upload_contractor_document,
        handlers::list_contractors,
        handlers::approve_contractor,
        handlers::reject_contractor,
        handlers::send_agreement,
        handlers::load_agreement,
        handlers::submit_agreement,
    ),
    components(schemas(
        ErrorResponse,
        OkResponse,
        LeadSubmission,
        LeadSubmitted,
        WelcomeRequest,
        FollowupsRun,
        AuthorizationRequest,
        AuthorizationAccepted,
        PricingSignal,
        AuditDraft,
        AuditRecord,
        AuditCreated,
        PublicAudit,
        ContractorStatus,
        RateCardSubmission,
        ContractorSubmitted,
        ContractorSummary,
        ContractorStatusChanged,
        SendAgreementRequest,
        AgreementDispatched,
        AgreementView,
        AgreementLoaded,
        AgreementSubmission,
        AgreementSigned,
        DocumentStored,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "leads", description = "Homeowner lead intake"),
        (name = "scheduler", description = "Follow-up cadence job"),
        (name = "authorization", description = "Signed homeowner authorizations"),
        (name = "audits", description = "Public audit reports"),
        (name = "contractors", description = "Contractor onboarding"),
        (name = "internal", description = "Analyst tools (admin key)")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by the scheduler and internal routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/leads",
            "/api/send-welcome",
            "/api/send-followups",
            "/api/authorization-notify",
            "/api/audits/{secure_id}",
            "/api/contractor-agreement-load",
            "/api/contractor-agreement-submit",
            "/api/contractor-send-agreement",
            "/api/internal/contractors/{id}/approve",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
