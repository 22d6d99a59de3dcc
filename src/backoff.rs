//! Delay computation between attempts.
//!
//! All functions take the uniform random draw `u` in `[0, 1)` as an argument
//! so the schedule is deterministic for a given draw. [`draw`] produces one
//! from a non-cryptographic thread-local generator.

use std::time::Duration;

use rand::Rng;

use crate::{RetryConfig, RetryPolicyKind};

/// Lowest jitter multiplier applied to a primary backoff delay.
pub const PRIMARY_JITTER_OFFSET: f64 = 0.8;
/// Width of the primary jitter window: factor is `offset + u * span`.
pub const PRIMARY_JITTER_SPAN: f64 = 0.5;

/// Nominal wait before probing the secondary endpoint.
pub const SECONDARY_PROBE_DELAY: Duration = Duration::from_secs(1);
/// Lowest jitter multiplier applied to [`SECONDARY_PROBE_DELAY`].
pub const SECONDARY_JITTER_OFFSET: f64 = 0.8;
/// Width of the secondary jitter window.
pub const SECONDARY_JITTER_SPAN: f64 = 0.5;

/// Draws `u` uniformly from `[0, 1)`.
pub fn draw() -> f64 {
    rand::thread_rng().gen::<f64>()
}

/// Delay before the `primary_try`-th attempt against the primary endpoint,
/// before jitter and clamping.
///
/// `primary_try` is 1-based; the first try never waits.
pub fn raw_delay(policy: RetryPolicyKind, primary_try: u32, base: Duration) -> Duration {
    match policy {
        RetryPolicyKind::Exponential => {
            let exponent = primary_try.saturating_sub(1);
            2u32.checked_pow(exponent)
                .and_then(|factor| base.checked_mul(factor - 1))
                .unwrap_or(Duration::MAX)
        }
        RetryPolicyKind::Fixed if primary_try <= 1 => Duration::ZERO,
        RetryPolicyKind::Fixed => base,
    }
}

/// Jittered delay before a primary attempt, clamped to `max`.
pub fn primary_delay(
    policy: RetryPolicyKind,
    primary_try: u32,
    base: Duration,
    max: Duration,
    u: f64,
) -> Duration {
    let raw = raw_delay(policy, primary_try, base);
    scale(raw, jitter_factor(PRIMARY_JITTER_OFFSET, PRIMARY_JITTER_SPAN, u)).min(max)
}

/// Jittered delay before a primary attempt using `config`'s schedule.
pub fn delay_for(config: &RetryConfig, primary_try: u32, u: f64) -> Duration {
    primary_delay(
        config.policy(),
        primary_try,
        config.retry_delay(),
        config.max_retry_delay(),
        u,
    )
}

/// Delay before an attempt against the secondary endpoint.
///
/// Independent of the primary schedule and of the configured maximum.
pub fn secondary_delay(u: f64) -> Duration {
    scale(
        SECONDARY_PROBE_DELAY,
        jitter_factor(SECONDARY_JITTER_OFFSET, SECONDARY_JITTER_SPAN, u),
    )
}

fn jitter_factor(offset: f64, span: f64, u: f64) -> f64 {
    offset + u.clamp(0.0, 1.0) * span
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{draw, primary_delay, raw_delay, secondary_delay};
    use crate::RetryPolicyKind;

    const BASE: Duration = Duration::from_secs(4);
    const MAX: Duration = Duration::from_secs(120);

    #[test]
    fn exponential_raw_delay_follows_power_of_two_minus_one() {
        let expected = [0, 4, 12, 28, 60, 124];
        for (index, secs) in expected.into_iter().enumerate() {
            let primary_try = index as u32 + 1;
            assert_eq!(
                raw_delay(RetryPolicyKind::Exponential, primary_try, BASE),
                Duration::from_secs(secs),
                "primary try {primary_try}"
            );
        }
    }

    #[test]
    fn exponential_raw_delay_is_non_decreasing_and_saturates() {
        let mut previous = Duration::ZERO;
        for primary_try in 1..=80 {
            let delay = raw_delay(RetryPolicyKind::Exponential, primary_try, BASE);
            assert!(delay >= previous, "primary try {primary_try} went backwards");
            previous = delay;
        }
        assert_eq!(previous, Duration::MAX);
    }

    #[test]
    fn fixed_raw_delay_is_zero_then_base() {
        assert_eq!(raw_delay(RetryPolicyKind::Fixed, 1, BASE), Duration::ZERO);
        for primary_try in 2..10 {
            assert_eq!(raw_delay(RetryPolicyKind::Fixed, primary_try, BASE), BASE);
        }
    }

    #[test]
    fn jitter_spans_point_eight_to_one_point_three() {
        let low = primary_delay(RetryPolicyKind::Fixed, 2, BASE, MAX, 0.0);
        let high = primary_delay(RetryPolicyKind::Fixed, 2, BASE, MAX, 0.999_999);

        assert_eq!(low, Duration::from_millis(3_200));
        assert!(high < Duration::from_millis(5_200));
        assert!(high > Duration::from_millis(5_199));
    }

    #[test]
    fn first_primary_try_never_waits() {
        for policy in [RetryPolicyKind::Exponential, RetryPolicyKind::Fixed] {
            assert_eq!(primary_delay(policy, 1, BASE, MAX, 0.7), Duration::ZERO);
        }
    }

    #[test]
    fn delays_stay_within_zero_and_max_for_any_draw() {
        for policy in [RetryPolicyKind::Exponential, RetryPolicyKind::Fixed] {
            for primary_try in 1..40 {
                for u in [0.0, 0.25, 0.5, 0.75, 0.999_999] {
                    let delay = primary_delay(policy, primary_try, BASE, MAX, u);
                    assert!(delay <= MAX, "{policy} try {primary_try} u {u}: {delay:?}");
                }
            }
        }
    }

    #[test]
    fn clamped_delay_equals_max() {
        let delay = primary_delay(RetryPolicyKind::Exponential, 10, BASE, MAX, 0.0);
        assert_eq!(delay, MAX);
    }

    #[test]
    fn secondary_delay_ignores_schedule() {
        assert_eq!(secondary_delay(0.0), Duration::from_millis(800));
        let high = secondary_delay(0.999_999);
        assert!(high > Duration::from_millis(1_299) && high < Duration::from_millis(1_300));
    }

    #[test]
    fn draws_are_in_unit_interval() {
        for _ in 0..1_000 {
            let u = draw();
            assert!((0.0..1.0).contains(&u));
        }
    }
}
