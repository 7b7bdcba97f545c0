// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attempt pricing.

use courier_core::ZonePolicy;

/// Round to 6 decimal places.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// `base_cost * (1 + markup_pct / 100)`, clamped to `[min_fee, max_fee]`,
/// rounded to 6 decimal places.
pub fn compute_cost(base_cost: f64, zone: &ZonePolicy) -> f64 {
    let marked_up = base_cost * (1.0 + zone.markup_pct / 100.0);
    // max/min rather than f64::clamp: never panics on inverted bounds.
    round6(marked_up.max(zone.min_fee).min(zone.max_fee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::ChannelFlags;
    use proptest::prelude::*;

    fn zone(min_fee: f64, max_fee: f64, markup_pct: f64) -> ZonePolicy {
        ZonePolicy {
            zone_code: "WA".into(),
            channels: ChannelFlags::default(),
            max_backoff_seconds: 300,
            max_retries: 5,
            min_fee,
            max_fee,
            markup_pct,
        }
    }

    #[test]
    fn ten_percent_markup_on_one_dollar() {
        assert_eq!(compute_cost(1.00, &zone(0.01, 5.0, 10.0)), 1.10);
    }

    #[test]
    fn clamps_to_fee_bounds() {
        let z = zone(0.05, 2.0, 0.0);
        assert_eq!(compute_cost(0.001, &z), 0.05);
        assert_eq!(compute_cost(9.0, &z), 2.0);
    }

    #[test]
    fn rounds_to_six_places() {
        assert_eq!(compute_cost(0.1234567, &zone(0.0, 10.0, 0.0)), 0.123457);
    }

    fn micros() -> impl Strategy<Value = f64> {
        (0u64..10_000_000).prop_map(|m| m as f64 / 1_000_000.0)
    }

    proptest! {
        #[test]
        fn always_within_bounds(
            base in 0.0f64..1000.0,
            markup in 0.0f64..500.0,
            lo in micros(),
            span in micros(),
        ) {
            let hi = round6(lo + span);
            let z = zone(lo, hi, markup);
            let cost = compute_cost(base, &z);
            prop_assert!(cost >= lo && cost <= hi, "{cost} not in [{lo}, {hi}]");
        }

        #[test]
        fn monotonic_in_base_cost(a in 0.0f64..100.0, b in 0.0f64..100.0, markup in 0.0f64..200.0) {
            let z = zone(0.0, 1_000_000.0, markup);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(compute_cost(lo, &z) <= compute_cost(hi, &z));
        }

        #[test]
        fn monotonic_in_markup(base in 0.0f64..100.0, a in 0.0f64..300.0, b in 0.0f64..300.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let cheap = compute_cost(base, &zone(0.0, 1_000_000.0, lo));
            let dear = compute_cost(base, &zone(0.0, 1_000_000.0, hi));
            prop_assert!(cheap <= dear);
        }

        #[test]
        fn deterministic(base in 0.0f64..100.0, markup in -50.0f64..300.0) {
            let z = zone(0.01, 50.0, markup);
            prop_assert_eq!(compute_cost(base, &z), compute_cost(base, &z));
        }
    }
}
