//! Shared fixtures: an in-memory store, a recording notifier and a config
//! that never points at real services.
#![allow(dead_code)]

use std::sync::Arc;
use url::Url;

use atlas_intake_api::config::Config;
use atlas_intake_api::handlers::AppState;
use atlas_intake_api::models::{LeadSubmission, RateCardSubmission};
use atlas_intake_api::notifier::RecordingNotifier;
use atlas_intake_api::store::MemoryStore;

pub const NOTIFY_EMAIL: &str = "recovery@atlas.test";
pub const ADMIN_KEY: &str = "admin-test-key";
pub const CRON_SECRET: &str = "cron-test-secret";

/// Helper function to create test config
pub fn create_test_config() -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 3000,
        resend_api_key: "re_test".to_string(),
        resend_from_email: "Atlas <audits@atlas.test>".to_string(),
        resend_base_url: "http://127.0.0.1:1".to_string(),
        auth_notify_email: Some(NOTIFY_EMAIL.to_string()),
        app_base_url: Url::parse("https://atlas.test").unwrap(),
        cron_secret: Some(CRON_SECRET.to_string()),
        admin_api_key: Some(ADMIN_KEY.to_string()),
        supabase_storage: None,
        analytics_webhook_url: None,
        run_migrations: false,
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> Harness {
    harness_with(create_test_config())
}

pub fn harness_with(config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let state = AppState::new(config, store.clone(), notifier.clone(), None).unwrap();

    Harness {
        state: Arc::new(state),
        store,
        notifier,
    }
}

pub fn lead_submission(email: &str) -> LeadSubmission {
    LeadSubmission {
        name: Some("Jordan Reyes".to_string()),
        phone: Some("(201) 555-0123".to_string()),
        email: Some(email.to_string()),
        zip_code: Some("85018".to_string()),
        project_type: Some("HVAC Replacement".to_string()),
        contractor_name: Some("Valley Comfort Air".to_string()),
        notes: None,
    }
}

pub fn rate_card(business_email: &str) -> RateCardSubmission {
    RateCardSubmission {
        legal_entity_name: Some("Sonoran Mechanical LLC".to_string()),
        dba: Some("Sonoran Air".to_string()),
        roc_license_number: Some("ROC-321987".to_string()),
        roc_classification: None,
        license_expiration_date: chrono::NaiveDate::from_ymd_opt(2027, 3, 31),
        owner_principal_name: Some("Alex Moreno".to_string()),
        direct_cell: Some("602-555-0177".to_string()),
        business_email: Some(business_email.to_string()),
        business_address: Some("400 E Van Buren St, Phoenix, AZ".to_string()),
        years_in_business: 12,
        commercial_crew_count: Some("3-5".to_string()),
        residential_crew_count: 4,
        average_weekly_install_capacity: 9,
        current_backlog_weeks: 2,
        w9_url: Some("https://files.atlas.test/w9/1-w9.pdf".to_string()),
        coi_url: Some("https://files.atlas.test/coi/1-coi.pdf".to_string()),
        general_liability_coverage_amount: Some("$2,000,000".to_string()),
        workers_comp_policy_number: Some("WC-778812".to_string()),
        bonding_capacity: None,
        service_capabilities: serde_json::json!({ "residentialHvac": true }),
        execution_rate_card: serde_json::json!({ "tonnage3": 4200 }),
        permit_responsibility_confirmed: true,
        inspection_responsibility_confirmed: true,
        rate_lock_confirmed: true,
    }
}

/// Pulls the agreement token out of an emailed link.
pub fn token_from_link(link: &str) -> String {
    link.split("token=").nth(1).unwrap_or_default().to_string()
}
