use chrono::Utc;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{missing_fields, AppError, ResultExt};
use crate::models::{AuditCreated, AuditDraft, AuditRecord, PublicAudit};
use crate::signal;
use crate::store::Store;

const DEFAULT_INDUSTRY: &str = "HVAC";

/// Audit records are immutable once written, so public reads are cached.
pub fn public_audit_cache() -> Cache<Uuid, PublicAudit> {
    Cache::builder()
        .time_to_live(Duration::from_secs(3600))
        .max_capacity(10_000)
        .build()
}

/// Builds a complete audit record from analyst input.
///
/// The secure id is a fresh random UUID. Signal, deviation and recommended
/// actions are always derived here, never taken from the caller.
pub fn build_audit(draft: AuditDraft) -> Result<AuditRecord, AppError> {
    let mut missing = missing_fields(&[
        ("homeownerName", draft.homeowner_name.as_deref()),
        ("zip", draft.zip.as_deref()),
    ]);
    if draft.permitted_valuation.is_none() {
        missing.push("permittedValuation");
    }
    if draft.market_median.is_none() {
        missing.push("marketMedian");
    }
    if !missing.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let permitted_valuation = draft.permitted_valuation.unwrap_or_default();
    let market_median = draft.market_median.unwrap_or_default();
    if !permitted_valuation.is_finite() || permitted_valuation < 0.0 {
        return Err(AppError::BadRequest(
            "permittedValuation must be a non-negative number".to_string(),
        ));
    }
    if !market_median.is_finite() {
        return Err(AppError::BadRequest(
            "marketMedian must be a number".to_string(),
        ));
    }

    let verdict = signal::classify(permitted_valuation, market_median);
    let now = Utc::now();

    Ok(AuditRecord {
        id: Uuid::new_v4(),
        created_at: now,
        homeowner_name: draft.homeowner_name.unwrap_or_default().trim().to_string(),
        homeowner_phone: draft
            .homeowner_phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()),
        industry: draft
            .industry
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| DEFAULT_INDUSTRY.to_string()),
        zip: draft.zip.unwrap_or_default().trim().to_string(),
        permit_issued_date: draft.permit_issued_date.unwrap_or_else(|| now.date_naive()),
        permitted_valuation,
        market_median,
        deviation_percent: verdict.deviation_percent,
        pricing_signal: verdict.signal,
        findings: signal::parse_findings(draft.findings.as_deref().unwrap_or_default()),
        what_this_means: signal::explanation_or_default(
            draft.what_this_means.as_deref(),
            verdict.signal,
        ),
        recommended_actions: signal::recommended_actions(verdict.signal)
            .iter()
            .map(|a| a.to_string())
            .collect(),
    })
}

/// Analyst-facing audit generator and the public report read.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    cache: Cache<Uuid, PublicAudit>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>, cache: Cache<Uuid, PublicAudit>) -> Self {
        Self {
            store,
            config,
            cache,
        }
    }

    pub async fn create_audit(&self, draft: AuditDraft) -> Result<AuditCreated, AppError> {
        let audit = build_audit(draft)?;
        self.store
            .insert_audit(&audit)
            .await
            .context("Failed to save audit")?;

        tracing::info!(
            "✓ Audit {} created: {} ({}%)",
            audit.id,
            audit.pricing_signal,
            audit.deviation_percent
        );

        let report_url = self.config.audit_report_url(&audit.id);
        Ok(AuditCreated {
            ok: true,
            audit,
            report_url,
        })
    }

    /// Restricted projection for report viewers. Never includes the phone.
    pub async fn get_public_audit(&self, secure_id: Uuid) -> Result<PublicAudit, AppError> {
        if let Some(cached) = self.cache.get(&secure_id).await {
            tracing::debug!("Audit cache hit: {}", secure_id);
            return Ok(cached);
        }

        let audit = self
            .store
            .get_public_audit(secure_id)
            .await
            .context("Failed to load audit")?
            .ok_or_else(|| AppError::NotFound("Audit not found".to_string()))?;

        self.cache.insert(secure_id, audit.clone()).await;
        Ok(audit)
    }

    /// Full record for analysts, phone included. Not cached.
    pub async fn get_audit(&self, id: Uuid) -> Result<AuditRecord, AppError> {
        self.store
            .get_audit(id)
            .await
            .context("Failed to load audit")?
            .ok_or_else(|| AppError::NotFound("Audit not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricingSignal;

    fn draft(v: f64, m: f64) -> AuditDraft {
        AuditDraft {
            homeowner_name: Some("Dana Ruiz".to_string()),
            homeowner_phone: Some("602-555-0199".to_string()),
            zip: Some("85016".to_string()),
            permitted_valuation: Some(v),
            market_median: Some(m),
            findings: Some("Overhead appears inflated\n\nNo line items".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_audit_derives_signal_and_defaults() {
        let audit = build_audit(draft(15_000.0, 9_000.0)).unwrap();
        assert_eq!(audit.pricing_signal, PricingSignal::Red);
        assert_eq!(audit.deviation_percent, 67);
        assert_eq!(audit.recommended_actions.len(), 3);
        assert_eq!(audit.industry, "HVAC");
        assert_eq!(audit.findings.len(), 2);
        assert_eq!(
            audit.what_this_means,
            signal::default_explanation(PricingSignal::Red)
        );
    }

    #[test]
    fn test_build_audit_names_missing_fields() {
        let err = build_audit(AuditDraft::default()).unwrap_err();
        let (_, message) = err.status_and_message();
        assert_eq!(
            message,
            "Missing required fields: homeownerName, zip, permittedValuation, marketMedian"
        );
    }

    #[test]
    fn test_each_audit_gets_a_fresh_secure_id() {
        let a = build_audit(draft(100.0, 100.0)).unwrap();
        let b = build_audit(draft(100.0, 100.0)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.get_version_num(), 4);
    }
}
