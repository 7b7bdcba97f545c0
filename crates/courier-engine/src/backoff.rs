// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry backoff between attempt cycles.

use chrono::Duration;
use rand::Rng;

/// Jitter-free delay in seconds: `min(2^retries * 5, max_backoff_seconds)`.
pub fn base_backoff_seconds(retry_count: u32, max_backoff_seconds: u64) -> u64 {
    let exp = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
    exp.saturating_mul(5).min(max_backoff_seconds)
}

/// Delay before the next cycle: the base plus `0..max_jitter_ms` of jitter,
/// never above `max_backoff_seconds`.
pub fn backoff_delay<R: Rng + ?Sized>(
    retry_count: u32,
    max_backoff_seconds: u64,
    max_jitter_ms: u64,
    rng: &mut R,
) -> Duration {
    let base_ms = base_backoff_seconds(retry_count, max_backoff_seconds).saturating_mul(1000);
    let jitter_ms = if max_jitter_ms == 0 {
        0
    } else {
        rng.gen_range(0..max_jitter_ms)
    };
    let cap_ms = max_backoff_seconds.saturating_mul(1000);
    let total = base_ms.saturating_add(jitter_ms).min(cap_ms);
    Duration::milliseconds(i64::try_from(total).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn doubles_from_five_seconds_until_capped() {
        let seq: Vec<u64> = (0..8).map(|r| base_backoff_seconds(r, 300)).collect();
        assert_eq!(seq, vec![5, 10, 20, 40, 80, 160, 300, 300]);
        assert_eq!(base_backoff_seconds(200, 300), 300);
    }

    #[test]
    fn jitter_stays_below_cap() {
        let mut rng = StdRng::seed_from_u64(7);
        for retry in 0..10 {
            let d = backoff_delay(retry, 60, 5000, &mut rng);
            assert!(d <= Duration::seconds(60));
            assert!(d >= Duration::seconds(base_backoff_seconds(retry, 60) as i64));
        }
    }

    proptest! {
        #[test]
        fn base_is_non_decreasing_and_capped(retry in 0u32..64, max in 0u64..100_000) {
            let a = base_backoff_seconds(retry, max);
            let b = base_backoff_seconds(retry + 1, max);
            prop_assert!(a <= b);
            prop_assert!(b <= max);
        }

        #[test]
        fn jittered_delay_never_exceeds_cap(retry in 0u32..64, max in 0u64..10_000, jitter in 0u64..5000, seed: u64) {
            let mut rng = StdRng::seed_from_u64(seed);
            let d = backoff_delay(retry, max, jitter, &mut rng);
            prop_assert!(d <= Duration::seconds(max as i64));
        }
    }
}
