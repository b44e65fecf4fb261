//! Pricing signal computation for audit records.
//!
//! The verdict depends only on the ratio of the permitted valuation to the
//! market median. Recommended actions and the default narrative are fixed
//! lookups keyed by the resulting signal.

use crate::models::PricingSignal;

/// Above this ratio the quote is flagged red.
pub const RED_RATIO: f64 = 1.4;
/// Above this ratio (and up to [`RED_RATIO`]) the quote is flagged yellow.
pub const YELLOW_RATIO: f64 = 1.15;

/// Signal plus the rounded deviation from the market median.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingVerdict {
    pub signal: PricingSignal,
    pub deviation_percent: i32,
}

/// Classifies a permitted valuation against the market median.
///
/// A non-positive median has no meaningful ratio; it yields `yellow` with a
/// zero deviation rather than an error.
pub fn classify(permitted_valuation: f64, market_median: f64) -> PricingVerdict {
    if market_median <= 0.0 {
        return PricingVerdict {
            signal: PricingSignal::Yellow,
            deviation_percent: 0,
        };
    }

    let ratio = permitted_valuation / market_median;
    let signal = if ratio > RED_RATIO {
        PricingSignal::Red
    } else if ratio > YELLOW_RATIO {
        PricingSignal::Yellow
    } else {
        PricingSignal::Green
    };

    PricingVerdict {
        signal,
        deviation_percent: deviation_percent(permitted_valuation, market_median),
    }
}

/// `round(((v - m) / m) * 100)`, or 0 when `m <= 0`.
///
/// Halves round toward positive infinity (`-12.5` becomes `-12`), matching how
/// the report front end rounds.
pub fn deviation_percent(permitted_valuation: f64, market_median: f64) -> i32 {
    if market_median <= 0.0 {
        return 0;
    }
    let raw = ((permitted_valuation - market_median) / market_median) * 100.0;
    (raw + 0.5).floor() as i32
}

/// Canned next steps for a signal.
pub fn recommended_actions(signal: PricingSignal) -> &'static [&'static str] {
    match signal {
        PricingSignal::Red => &[
            "Do not sign the current contract.",
            "Request a line-item breakdown of overhead fees.",
            "Get a second opinion from an audit-cleared provider.",
        ],
        PricingSignal::Yellow => &[
            "Negotiate the labor rate.",
            "Verify specific model numbers match the quote.",
        ],
        PricingSignal::Green => &["Proceed with confidence. Price is within market range."],
    }
}

/// Narrative used when the analyst leaves the explanation blank.
pub fn default_explanation(signal: PricingSignal) -> &'static str {
    match signal {
        PricingSignal::Red => {
            "The permitted valuation is significantly lower than your quote. This typically \
             indicates high sales commissions (25%+) or extreme overhead markup, rather than \
             actual material cost."
        }
        PricingSignal::Yellow => {
            "The quote is on the higher end of the spectrum. This may be due to premium \
             equipment selection or seasonal demand pricing."
        }
        PricingSignal::Green => {
            "Your quote is consistent with other recently permitted projects in your zip code. \
             The contractor's margins appear to be within standard industry limits."
        }
    }
}

/// Analyst explanation when present, otherwise the default for the signal.
pub fn explanation_or_default(explanation: Option<&str>, signal: PricingSignal) -> String {
    match explanation.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => default_explanation(signal).to_string(),
    }
}

/// Splits the findings textarea into one finding per non-blank line.
pub fn parse_findings(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
