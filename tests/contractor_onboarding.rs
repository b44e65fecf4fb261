/// Contractor rate card, approval, agreement and signature flow
mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use atlas_intake_api::models::{AgreementSubmission, Contractor, ContractorStatus};
use common::{harness, rate_card, token_from_link, Harness, NOTIFY_EMAIL};

const PARTNER_EMAIL: &str = "office@sonoran.test";

async fn stored_contractor(h: &Harness, id: Uuid) -> Contractor {
    h.store
        .contractors
        .lock()
        .await
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .expect("contractor should exist")
}

fn signature(token: &str) -> AgreementSubmission {
    AgreementSubmission {
        token: Some(token.to_string()),
        signer_name: Some("Alex Moreno".to_string()),
        signer_title: Some("Owner".to_string()),
        signed_pdf_url: Some("https://files.atlas.test/agreements/1-signed.pdf".to_string()),
    }
}

#[tokio::test]
async fn test_full_onboarding_flow() {
    let h = harness();
    let contractors = &h.state.contractors;

    let contractor = contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();
    assert_eq!(contractor.status, ContractorStatus::PendingReview);
    assert_eq!(contractor.roc_classification, "C-39");
    assert_eq!(contractor.agreement_token.len(), 64);

    let approved = contractors.approve(contractor.id).await.unwrap();
    assert_eq!(approved.status, ContractorStatus::AgreementSent);

    let sent = h.notifier.sent_to(PARTNER_EMAIL).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].subject,
        "Atlas Master Subcontractor Agreement - Signature Required"
    );
    let link = approved.agreement_link.expect("approve returns the link");
    assert!(sent[0].html.contains(&link));
    assert!(link.starts_with("https://atlas.test/partner/master-subcontractor?token="));

    // The emailed link carries the stored token
    let token = token_from_link(&link);
    assert_eq!(token, contractor.agreement_token);
    assert_eq!(h.notifier.sent_to(NOTIFY_EMAIL).await.len(), 1);

    let view = contractors.load_agreement(Some(&token)).await.unwrap();
    assert_eq!(view.id, contractor.id);
    assert_eq!(view.status, ContractorStatus::AgreementSent);

    let signed = contractors.submit_agreement(signature(&token)).await.unwrap();
    assert!(signed.ok);
    assert!(signed.confirmation_emailed);

    let stored = stored_contractor(&h, contractor.id).await;
    assert_eq!(stored.status, ContractorStatus::ActivePartner);
    assert_eq!(stored.agreement_signer_name.as_deref(), Some("Alex Moreno"));
    assert!(stored.agreement_signed_at.is_some());

    let confirmations = h.notifier.sent_to(PARTNER_EMAIL).await;
    assert_eq!(confirmations.len(), 2);
    assert_eq!(confirmations[1].subject, "Atlas Partner Agreement Completed");
    assert_eq!(h.notifier.sent_to(NOTIFY_EMAIL).await.len(), 2);
}

#[tokio::test]
async fn test_used_token_cannot_sign_twice() {
    let h = harness();
    let contractors = &h.state.contractors;
    let contractor = contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();
    contractors.approve(contractor.id).await.unwrap();
    let token = contractor.agreement_token.clone();

    contractors.submit_agreement(signature(&token)).await.unwrap();

    let err = contractors
        .submit_agreement(signature(&token))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = contractors.load_agreement(Some(&token)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_token_before_agreement_sent_is_not_found() {
    let h = harness();
    let contractor = h
        .state
        .contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();

    let err = h
        .state
        .contractors
        .load_agreement(Some(&contractor.agreement_token))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = h.state.contractors.load_agreement(None).await.unwrap_err();
    assert_eq!(err.status_and_message().0.as_u16(), 400);

    let err = h
        .state
        .contractors
        .load_agreement(Some("not-a-real-token"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_signature_requires_every_field() {
    let h = harness();
    let err = h
        .state
        .contractors
        .submit_agreement(AgreementSubmission {
            token: Some("abc".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    let (status, message) = err.status_and_message();
    assert_eq!(status.as_u16(), 400);
    assert_eq!(
        message,
        "Missing required fields: signerName, signerTitle, signedPdfUrl"
    );
}

#[tokio::test]
async fn test_active_partner_cannot_be_rejected() {
    let h = harness();
    let contractors = &h.state.contractors;
    let contractor = contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();
    contractors.approve(contractor.id).await.unwrap();
    contractors
        .submit_agreement(signature(&contractor.agreement_token))
        .await
        .unwrap();

    let err = contractors.reject(contractor.id).await.unwrap_err();
    assert_eq!(err.status_and_message().0.as_u16(), 409);
    assert_eq!(
        stored_contractor(&h, contractor.id).await.status,
        ContractorStatus::ActivePartner
    );
}

#[tokio::test]
async fn test_rejected_contractor_cannot_be_approved() {
    let h = harness();
    let contractors = &h.state.contractors;
    let contractor = contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();

    let rejected = contractors.reject(contractor.id).await.unwrap();
    assert_eq!(rejected.status, ContractorStatus::Rejected);

    let err = contractors.approve(contractor.id).await.unwrap_err();
    assert_eq!(err.status_and_message().0.as_u16(), 409);
    assert!(h.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_unknown_contractor_is_not_found() {
    let h = harness();
    let contractors = &h.state.contractors;

    assert!(contractors.approve(Uuid::new_v4()).await.unwrap_err().is_not_found());
    assert!(contractors.reject(Uuid::new_v4()).await.unwrap_err().is_not_found());
    assert!(contractors
        .send_agreement(Uuid::new_v4())
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_failed_first_send_keeps_approval_and_is_retried() {
    let h = harness();
    let contractors = &h.state.contractors;
    let contractor = contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();
    h.notifier.fail_for(PARTNER_EMAIL).await;

    let err = contractors.approve(contractor.id).await.unwrap_err();
    assert_eq!(err.status_and_message().0.as_u16(), 502);

    let mut stored = stored_contractor(&h, contractor.id).await;
    assert_eq!(stored.status, ContractorStatus::Approved);
    assert!(stored.agreement_sent_at.is_none());

    // Too recent for the sweep
    h.notifier.recover(PARTNER_EMAIL).await;
    let run = h.state.followups.run(Utc::now()).await.unwrap();
    assert_eq!(run.agreements_retried, 0);

    stored.approved_at = Some(Utc::now() - Duration::minutes(11));
    h.store.put_contractor(stored).await;

    let run = h.state.followups.run(Utc::now()).await.unwrap();
    assert_eq!(run.agreements_retried, 1);
    assert_eq!(
        stored_contractor(&h, contractor.id).await.status,
        ContractorStatus::AgreementSent
    );
    assert_eq!(h.notifier.sent_to(PARTNER_EMAIL).await.len(), 1);
}

#[tokio::test]
async fn test_resend_keeps_agreement_sent_status() {
    let h = harness();
    let contractors = &h.state.contractors;
    let contractor = contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();
    contractors.approve(contractor.id).await.unwrap();

    let dispatched = contractors.send_agreement(contractor.id).await.unwrap();
    assert_eq!(token_from_link(&dispatched.agreement_link), contractor.agreement_token);
    assert_eq!(h.notifier.sent_to(PARTNER_EMAIL).await.len(), 2);

    // A failed resend does not roll the contractor back
    h.notifier.fail_for(PARTNER_EMAIL).await;
    assert!(contractors.send_agreement(contractor.id).await.is_err());
    assert_eq!(
        stored_contractor(&h, contractor.id).await.status,
        ContractorStatus::AgreementSent
    );
}

#[tokio::test]
async fn test_send_agreement_requires_approval() {
    let h = harness();
    let contractor = h
        .state
        .contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();

    let err = h
        .state
        .contractors
        .send_agreement(contractor.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_and_message().0.as_u16(), 409);
    assert!(h.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_signature_stands_when_confirmation_fails() {
    let h = harness();
    let contractors = &h.state.contractors;
    let contractor = contractors
        .submit_rate_card(rate_card(PARTNER_EMAIL))
        .await
        .unwrap();
    contractors.approve(contractor.id).await.unwrap();
    h.notifier.fail_for(NOTIFY_EMAIL).await;

    let signed = contractors
        .submit_agreement(signature(&contractor.agreement_token))
        .await
        .unwrap();
    assert!(signed.ok);
    assert!(!signed.confirmation_emailed);
    assert_eq!(
        stored_contractor(&h, contractor.id).await.status,
        ContractorStatus::ActivePartner
    );
}

#[tokio::test]
async fn test_rate_card_requires_confirmations() {
    let h = harness();
    let mut submission = rate_card(PARTNER_EMAIL);
    submission.rate_lock_confirmed = false;

    let err = h
        .state
        .contractors
        .submit_rate_card(submission)
        .await
        .unwrap_err();
    assert_eq!(err.status_and_message().0.as_u16(), 400);
    assert!(h.store.contractors.lock().await.is_empty());
}

#[tokio::test]
async fn test_list_is_newest_first_and_hides_token() {
    let h = harness();
    let contractors = &h.state.contractors;
    let first = contractors
        .submit_rate_card(rate_card("first@partner.test"))
        .await
        .unwrap();
    let second = contractors
        .submit_rate_card(rate_card("second@partner.test"))
        .await
        .unwrap();

    let mut older = stored_contractor(&h, first.id).await;
    older.created_at = Utc::now() - Duration::days(1);
    h.store.put_contractor(older).await;

    let listed = contractors.list().await.unwrap();
    assert_eq!(
        listed.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );

    let json = serde_json::to_string(&listed).unwrap();
    assert!(!json.contains(&first.agreement_token));
    assert!(!json.contains("agreementToken"));
}
