/// Property-based tests for the pricing signal and authorization savings
use proptest::prelude::*;

use atlas_intake_api::authorization::savings;
use atlas_intake_api::models::PricingSignal;
use atlas_intake_api::signal::{classify, deviation_percent, RED_RATIO, YELLOW_RATIO};

fn expected_signal(valuation: f64, median: f64) -> PricingSignal {
    let ratio = valuation / median;
    if ratio > RED_RATIO {
        PricingSignal::Red
    } else if ratio > YELLOW_RATIO {
        PricingSignal::Yellow
    } else {
        PricingSignal::Green
    }
}

proptest! {
    /// Signal follows the valuation ratio thresholds
    #[test]
    fn signal_follows_ratio_thresholds(
        valuation in 0.0f64..5_000_000.0,
        median in 1.0f64..1_000_000.0,
    ) {
        let verdict = classify(valuation, median);
        prop_assert_eq!(verdict.signal, expected_signal(valuation, median));
    }

    /// Deviation is the raw percentage rounded to the nearest integer
    #[test]
    fn deviation_is_rounded_percentage(
        valuation in 0.0f64..5_000_000.0,
        median in 1.0f64..1_000_000.0,
    ) {
        let raw = ((valuation - median) / median) * 100.0;
        let deviation = deviation_percent(valuation, median) as f64;
        prop_assert!((deviation - raw).abs() <= 0.5 + 1e-9);
        prop_assert_eq!(classify(valuation, median).deviation_percent as f64, deviation);
    }

    /// Quotes at or below the market median are never red or yellow
    #[test]
    fn at_or_below_median_is_green(
        median in 1.0f64..1_000_000.0,
        fraction in 0.0f64..=1.0,
    ) {
        let verdict = classify(median * fraction, median);
        prop_assert_eq!(verdict.signal, PricingSignal::Green);
        prop_assert!(verdict.deviation_percent <= 0);
    }

    /// A non-positive median degrades to yellow with zero deviation
    #[test]
    fn non_positive_median_is_yellow(
        valuation in 0.0f64..5_000_000.0,
        median in -1_000_000.0f64..=0.0,
    ) {
        let verdict = classify(valuation, median);
        prop_assert_eq!(verdict.signal, PricingSignal::Yellow);
        prop_assert_eq!(verdict.deviation_percent, 0);
    }

    /// Savings are never negative and equal the positive difference
    #[test]
    fn savings_never_negative(
        current in -1_000_000.0f64..1_000_000.0,
        authorized in -1_000_000.0f64..1_000_000.0,
    ) {
        let saved = savings(current, authorized);
        prop_assert!(saved >= 0.0);
        prop_assert_eq!(saved, (current - authorized).max(0.0));
    }
}

#[test]
fn test_threshold_boundaries() {
    // Exactly at a threshold stays in the lower band
    assert_eq!(classify(115.0, 100.0).signal, PricingSignal::Green);
    assert_eq!(classify(140.0, 100.0).signal, PricingSignal::Yellow);
    assert_eq!(classify(140.01, 100.0).signal, PricingSignal::Red);

    assert_eq!(classify(18_400.0, 11_500.0).deviation_percent, 60);
    assert_eq!(classify(0.0, 0.0).signal, PricingSignal::Yellow);
}
