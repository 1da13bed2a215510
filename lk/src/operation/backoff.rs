//! Timing arithmetic for attempts

use std::time::Duration;

use crate::network::NetworkQuality;

/// Ceiling of the synthetic progress indicator
pub const PROGRESS_CEILING: u8 = 90;

/// Delay before retry number `attempt + 1`: `min(base * 2^attempt, max)`
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Base timeout scaled by network quality, rounded to whole milliseconds
pub fn adjusted_timeout(base: Duration, quality: NetworkQuality) -> Duration {
    let millis = base.as_millis() as f64 * quality.timeout_factor();
    Duration::from_millis(millis.round() as u64)
}

/// Next value of the synthetic progress indicator.
///
/// Closes a tenth of the remaining gap each tick and never passes the ceiling.
pub fn next_progress(current: u8) -> u8 {
    if current >= PROGRESS_CEILING {
        return PROGRESS_CEILING;
    }
    let step = ((PROGRESS_CEILING - current) / 10).max(1);
    (current + step).min(PROGRESS_CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE: Duration = Duration::from_millis(1_000);
    const MAX: Duration = Duration::from_millis(10_000);

    #[test]
    fn test_backoff_sequence() {
        assert_eq!(backoff_delay(0, BASE, MAX), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(1, BASE, MAX), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(2, BASE, MAX), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(3, BASE, MAX), Duration::from_millis(8_000));
        assert_eq!(backoff_delay(4, BASE, MAX), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(40, BASE, MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn test_adjusted_timeout() {
        let base = Duration::from_millis(30_000);
        assert_eq!(adjusted_timeout(base, NetworkQuality::Slow), Duration::from_millis(60_000));
        assert_eq!(adjusted_timeout(base, NetworkQuality::Fast), Duration::from_millis(21_000));
        assert_eq!(adjusted_timeout(base, NetworkQuality::Good), base);
        assert_eq!(adjusted_timeout(base, NetworkQuality::Unknown), base);
    }

    #[test]
    fn test_progress_approaches_ceiling() {
        let mut progress = 0;
        for _ in 0..200 {
            progress = next_progress(progress);
        }
        assert_eq!(progress, PROGRESS_CEILING);
        assert_eq!(next_progress(0), 9);
    }

    proptest! {
        #[test]
        fn prop_backoff_bounded_and_monotonic(attempt in 0u32..64) {
            let delay = backoff_delay(attempt, BASE, MAX);
            prop_assert!(delay <= MAX);
            prop_assert!(delay >= BASE);
            prop_assert!(backoff_delay(attempt + 1, BASE, MAX) >= delay);
        }

        #[test]
        fn prop_progress_never_completes(start in 0u8..=100) {
            let next = next_progress(start);
            prop_assert!(next <= PROGRESS_CEILING);
        }
    }
}
