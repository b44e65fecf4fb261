use chrono::Utc;
use std::env;

use atlas_intake_api::db::Database;
use atlas_intake_api::models::{CadenceStage, NewLead};
use atlas_intake_api::store::{claim_timestamp, PgStore, Store};

async fn store() -> anyhow::Result<PgStore> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url, true).await?;
    Ok(PgStore::new(db.pool.clone()))
}

/// Integration smoke test for the cadence claim against Postgres.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn cadence_claim_smoke_test() -> anyhow::Result<()> {
    let store = store().await?;

    let lead = store
        .insert_lead(&NewLead {
            name: "Smoke Test".to_string(),
            phone: "+12015550123".to_string(),
            email: format!("smoke+{}@atlas.test", Utc::now().timestamp_millis()),
            zip_code: "85004".to_string(),
            project_type: "HVAC".to_string(),
            contractor_name: None,
            notes: None,
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    // Follow-up 1 cannot be claimed before the welcome
    let at = claim_timestamp();
    let claimed = store
        .claim_cadence_stage(lead.id, CadenceStage::FollowUp1, at)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(!claimed);

    let claimed = store
        .claim_cadence_stage(lead.id, CadenceStage::Welcome, at)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(claimed);

    let again = store
        .claim_cadence_stage(lead.id, CadenceStage::Welcome, claim_timestamp())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(!again);

    // Release only clears the claim made with the same timestamp
    store
        .release_cadence_stage(lead.id, CadenceStage::Welcome, at)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let reloaded = store
        .get_lead(lead.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("lead vanished"))?;
    assert!(reloaded.welcome_sent_at.is_none());

    Ok(())
}

/// Public audit reads go through the restricted projection.
#[tokio::test]
#[ignore]
async fn public_audit_projection_smoke_test() -> anyhow::Result<()> {
    let store = store().await?;

    let audit = atlas_intake_api::audits::build_audit(atlas_intake_api::models::AuditDraft {
        homeowner_name: Some("Smoke Test".to_string()),
        homeowner_phone: Some("+16025550100".to_string()),
        zip: Some("85004".to_string()),
        permitted_valuation: Some(15_000.0),
        market_median: Some(10_000.0),
        ..Default::default()
    })
    .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    store
        .insert_audit(&audit)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let public = store
        .get_public_audit(audit.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("audit not visible"))?;
    assert_eq!(public.pricing_signal, audit.pricing_signal);
    assert!(serde_json::to_value(&public)?.get("homeownerPhone").is_none());

    let full = store
        .get_audit(audit.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("audit missing"))?;
    assert_eq!(full.homeowner_phone.as_deref(), Some("+16025550100"));

    Ok(())
}
