//! HTML bodies for every email the service sends.
//!
//! All caller-provided text goes through [`escape_html`] before it is
//! interpolated. Links we build ourselves are escaped too, since they can
//! carry query strings.

use chrono::{DateTime, Utc};

use crate::models::{AuthorizationRequest, Contractor};
use crate::notifier::OutboundEmail;

const WRAPPER_OPEN: &str =
    r#"<div style="font-family:Arial,sans-serif;line-height:1.6;color:#0f172a;max-width:560px;margin:0 auto;">"#;
const WIDE_WRAPPER_OPEN: &str =
    r#"<div style="font-family:Arial,sans-serif;line-height:1.6;color:#0f172a;max-width:680px;margin:0 auto;">"#;
const SIGNATURE: &str =
    r#"<p style="margin-top:24px;color:#64748b;font-size:13px;">Atlas Construction Consulting</p>"#;

/// Safe for element text and for either kind of quoted attribute.
pub fn escape_html(raw: &str) -> String {
    html_escape::encode_quoted_attribute(raw).into_owned()
}

/// Whole dollars with thousands separators, e.g. `12,500`. Cents are shown
/// only when present.
pub fn format_usd(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents_total = (amount.abs() * 100.0).round() as u64;
    let dollars = cents_total / 100;
    let cents = cents_total % 100;

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative && cents_total > 0 { "-" } else { "" };
    if cents == 0 {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{:02}", sign, grouped, cents)
    }
}

pub fn welcome(to: &str, name: &str, project_type: &str) -> OutboundEmail {
    let html = format!(
        "{open}<h2 style=\"margin-bottom:8px;\">Request Received</h2>\
         <p>Hi {name},</p>\
         <p>We received your <strong>{project}</strong> audit request and our team is reviewing it now.</p>\
         <p>We will follow up with your audit details shortly.</p>{sig}</div>",
        open = WRAPPER_OPEN,
        name = escape_html(name),
        project = escape_html(project_type),
        sig = SIGNATURE,
    );
    OutboundEmail::new(to, "Atlas: We received your audit request", html)
}

pub fn followup_one(to: &str, name: &str, project_type: &str, request_link: &str) -> OutboundEmail {
    let html = format!(
        "{open}<h2 style=\"margin-bottom:8px;\">Quick Follow-Up</h2>\
         <p>Hi {name},</p>\
         <p>Before signing, make sure your {project} quote includes clear line-item pricing and scope details.</p>\
         <p>You can submit additional details anytime here: <a href=\"{link}\">Request Audit</a></p>{sig}</div>",
        open = WRAPPER_OPEN,
        name = escape_html(name),
        project = escape_html(project_type),
        link = escape_html(request_link),
        sig = SIGNATURE,
    );
    OutboundEmail::new(to, "Atlas: Your next step before signing", html)
}

pub fn followup_two(to: &str, name: &str, request_link: &str) -> OutboundEmail {
    let html = format!(
        "{open}<h2 style=\"margin-bottom:8px;\">Final Reminder</h2>\
         <p>Hi {name},</p>\
         <p>If you still want an independent pricing check, you can complete or update your request here:</p>\
         <p><a href=\"{link}\">Open Request Form</a></p>{sig}</div>",
        open = WRAPPER_OPEN,
        name = escape_html(name),
        link = escape_html(request_link),
        sig = SIGNATURE,
    );
    OutboundEmail::new(to, "Atlas: Final reminder for your audit request", html)
}

/// Internal notice for a signed homeowner authorization.
///
/// Absent fields have already been defaulted by the caller; `savings` is the
/// server-side figure, never the client's.
pub fn authorization_notice(to: &str, request: &AuthorizationRequest, savings: f64) -> OutboundEmail {
    let text = |value: &Option<String>, default: &str| {
        escape_html(value.as_deref().unwrap_or(default))
    };

    let signed_pdf = match request.signed_pdf_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let url = escape_html(url);
            format!(
                "<p><strong>Signed PDF:</strong> <a href=\"{0}\" target=\"_blank\" rel=\"noreferrer\">{0}</a></p>",
                url
            )
        }
        None => "<p><strong>Signed PDF:</strong> Not provided in form.</p>".to_string(),
    };

    let html = format!(
        "<div style=\"font-family:Arial,sans-serif;line-height:1.6;color:#0f172a;max-width:640px;margin:0 auto;\">\
         <h2 style=\"margin-bottom:12px;\">New Authorization Submission</h2>\
         <p><strong>Homeowner:</strong> {homeowner}</p>\
         <p><strong>Email:</strong> {email}</p>\
         <p><strong>Permit ID:</strong> {permit}</p>\
         <p><strong>Property Address:</strong> {address}</p>\
         <p><strong>Project Type:</strong> {project}</p>\
         <p><strong>Current Permit Valuation:</strong> ${current}</p>\
         <p><strong>Atlas Authorized Rate:</strong> ${authorized}</p>\
         <p><strong>Total Savings:</strong> ${savings}</p>\
         {signed_pdf}</div>",
        homeowner = text(&request.homeowner_name, "N/A"),
        email = text(&request.homeowner_email, "N/A"),
        permit = text(&request.permit_id, "N/A"),
        address = text(&request.property_address, "N/A"),
        project = text(&request.project_type, "HVAC Replacement"),
        current = format_usd(request.current_valuation.unwrap_or(0.0)),
        authorized = format_usd(request.authorized_rate.unwrap_or(0.0)),
        savings = format_usd(savings),
        signed_pdf = signed_pdf,
    );
    OutboundEmail::new(to, "Atlas Authorization Signed - New Recovery File", html)
}

pub fn agreement_link(contractor: &Contractor, link: &str) -> OutboundEmail {
    let link = escape_html(link);
    let html = format!(
        "{open}<h2 style=\"margin-bottom:12px;\">Master Subcontractor Agreement</h2>\
         <p>Hi {owner},</p>\
         <p>Your HVAC Execution Rate Card has been approved by Atlas Construction Intelligence.</p>\
         <p>Please complete the binding Master Subcontractor Agreement here:</p>\
         <p><a href=\"{link}\" style=\"display:inline-block;background:#0f172a;color:#fff;padding:10px 16px;text-decoration:none;border-radius:6px;\">Open Agreement</a></p>\
         <p>If the button does not work, copy this link:</p>\
         <p>{link}</p>\
         <hr style=\"border:none;border-top:1px solid #e2e8f0;margin:18px 0;\" />\
         <p><strong>Entity:</strong> {entity}</p>\
         <p><strong>ROC License:</strong> {roc}</p>\
         <p><strong>Rate Submission Date:</strong> {submitted}</p></div>",
        open = WIDE_WRAPPER_OPEN,
        owner = escape_html(&contractor.owner_principal_name),
        link = link,
        entity = escape_html(&contractor.legal_entity_name),
        roc = escape_html(&contractor.roc_license_number),
        submitted = short_date(contractor.rate_submitted_at),
    );
    OutboundEmail::new(
        &contractor.business_email,
        "Atlas Master Subcontractor Agreement - Signature Required",
        html,
    )
}

pub fn agreement_sent_notice(to: &str, contractor: &Contractor) -> OutboundEmail {
    let html = format!(
        "<p>Agreement sent to {} ({}).</p>",
        escape_html(&contractor.legal_entity_name),
        escape_html(&contractor.business_email),
    );
    OutboundEmail::new(to, "Partner Agreement Sent", html)
}

/// Confirmation body shared by the partner copy and the internal copy.
pub fn agreement_completed(
    to: &str,
    contractor: &Contractor,
    signer_name: &str,
    signer_title: &str,
    signed_pdf_url: &str,
) -> OutboundEmail {
    let pdf = escape_html(signed_pdf_url);
    let html = format!(
        "{open}<h2>Agreement Recorded - Active Partner</h2>\
         <p>Entity: <strong>{entity}</strong></p>\
         <p>Signer: <strong>{signer}</strong> ({title})</p>\
         <p>Signed PDF: <a href=\"{pdf}\">{pdf}</a></p></div>",
        open = WIDE_WRAPPER_OPEN,
        entity = escape_html(&contractor.legal_entity_name),
        signer = escape_html(signer_name),
        title = escape_html(signer_title),
        pdf = pdf,
    );
    OutboundEmail::new(to, "Atlas Partner Agreement Completed", html)
}

fn short_date(at: DateTime<Utc>) -> String {
    at.format("%-m/%-d/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & co"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; co"
        );
        let attr = escape_html("' onmouseover='steal()");
        assert!(!attr.contains('\''), "single quotes must be escaped: {}", attr);
        assert!(attr.contains("onmouseover="));
        assert_eq!(escape_html("Jane Doe"), "Jane Doe");
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(0.0), "0");
        assert_eq!(format_usd(950.0), "950");
        assert_eq!(format_usd(12_500.0), "12,500");
        assert_eq!(format_usd(1_234_567.0), "1,234,567");
        assert_eq!(format_usd(3_000.5), "3,000.50");
    }

    #[test]
    fn test_welcome_escapes_name() {
        let email = welcome("jane@example.com", "<b>Jane</b>", "HVAC");
        assert_eq!(email.to, "jane@example.com");
        assert!(email.html.contains("&lt;b&gt;Jane&lt;/b&gt;"));
        assert!(!email.html.contains("<b>Jane</b>"));
        assert!(email.html.contains("<strong>HVAC</strong>"));
    }

    #[test]
    fn test_followups_link_to_request_form() {
        let link = "https://atlasconsulting.phx/#/request-audit";
        assert!(followup_one("a@b.c", "A", "Roofing", link).html.contains(link));
        assert!(followup_two("a@b.c", "A", link).html.contains(link));
    }

    #[test]
    fn test_authorization_notice_defaults() {
        let email = authorization_notice("ops@atlas.test", &AuthorizationRequest::default(), 0.0);
        assert!(email.html.contains("<strong>Permit ID:</strong> N/A"));
        assert!(email.html.contains("<strong>Project Type:</strong> HVAC Replacement"));
        assert!(email.html.contains("Not provided in form."));
        assert!(email.html.contains("<strong>Total Savings:</strong> $0"));
    }
}
