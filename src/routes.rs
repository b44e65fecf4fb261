use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{self, method_not_allowed, AppState};
use crate::openapi::ApiDoc;

const BODY_LIMIT: usize = 5 * 1024 * 1024;
const DOCUMENT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Builds the full router.
///
/// `rate_limited` adds the per-IP governor; tests drive the router without a
/// socket, so there is no peer address to key on.
pub fn build_app(state: Arc<AppState>, rate_limited: bool) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route(
            "/api/leads",
            post(handlers::submit_lead).fallback(method_not_allowed),
        )
        .route(
            "/api/send-welcome",
            post(handlers::send_welcome).fallback(method_not_allowed),
        )
        .route(
            "/api/send-followups",
            get(handlers::send_followups).fallback(method_not_allowed),
        )
        .route(
            "/api/authorization-notify",
            post(handlers::authorization_notify).fallback(method_not_allowed),
        )
        .route(
            "/api/audits/:secure_id",
            get(handlers::get_public_audit).fallback(method_not_allowed),
        )
        .route(
            "/api/contractors",
            post(handlers::submit_rate_card).fallback(method_not_allowed),
        )
        .route(
            "/api/contractor-agreement-load",
            get(handlers::load_agreement).fallback(method_not_allowed),
        )
        .route(
            "/api/contractor-agreement-submit",
            post(handlers::submit_agreement).fallback(method_not_allowed),
        )
        // Internal tools (admin bearer key)
        .route(
            "/api/contractor-send-agreement",
            post(handlers::send_agreement).fallback(method_not_allowed),
        )
        .route(
            "/api/internal/audits",
            post(handlers::create_audit).fallback(method_not_allowed),
        )
        .route(
            "/api/internal/audits/:id",
            get(handlers::get_internal_audit).fallback(method_not_allowed),
        )
        .route(
            "/api/internal/contractors",
            get(handlers::list_contractors).fallback(method_not_allowed),
        )
        .route(
            "/api/internal/contractors/:id/approve",
            post(handlers::approve_contractor).fallback(method_not_allowed),
        )
        .route(
            "/api/internal/contractors/:id/reject",
            post(handlers::reject_contractor).fallback(method_not_allowed),
        )
        // Request size limit: 5MB max payload
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT));

    // Uploads get a larger limit than the JSON routes
    let upload_routes = Router::new()
        .route(
            "/api/contractor-documents",
            post(handlers::upload_contractor_document).fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(DOCUMENT_BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(DOCUMENT_BODY_LIMIT));

    let mut protected_routes = api_routes.merge(upload_routes);

    if rate_limited {
        // Rate limiting: 10 req/sec per IP, burst of 20
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(10)
                .burst_size(20)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
        );
        protected_routes = protected_routes.layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }));
    }

    // Health check and docs bypass rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    Ok(app)
}
