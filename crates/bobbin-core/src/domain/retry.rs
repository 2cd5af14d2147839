//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with a ceiling and symmetric jitter.
///
/// `delay = min(max_delay, initial_delay * 2^retry_count)`, then multiplied by
/// a uniform factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Fraction of the delay used as jitter amplitude (0.1 = ±10%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay before jitter for a job that has consumed `retry_count` retries.
    ///
    /// Example with initial=1s, max=60s:
    /// - retry_count 0: 1s
    /// - retry_count 3: 8s
    /// - retry_count 6 and above: 60s
    pub fn base_delay(&self, retry_count: u32) -> Duration {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Delay with jitter drawn from `rng`.
    pub fn delay_with<R: Rng + ?Sized>(&self, retry_count: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(retry_count);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
        base.mul_f64(factor.max(0.0))
    }

    pub fn next_delay(&self, retry_count: u32) -> Duration {
        self.delay_with(retry_count, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    #[test]
    fn default_policy_has_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(60));
        assert_eq!(policy.jitter, 0.1);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(5, 32)]
    #[case(6, 60)]
    #[case(10, 60)]
    #[case(64, 60)]
    fn base_delay_doubles_until_cap(#[case] retry_count: u32, #[case] secs: u64) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(retry_count), Duration::from_secs(secs));
    }

    #[test]
    fn delays_are_monotonic_and_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..=10).map(|n| policy.base_delay(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(60)));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for retry_count in 0..=10 {
            let base = policy.base_delay(retry_count).as_secs_f64();
            for _ in 0..50 {
                let d = policy.delay_with(retry_count, &mut rng).as_secs_f64();
                assert!(d >= base * 0.9 - 1e-9 && d <= base * 1.1 + 1e-9, "{d} vs {base}");
            }
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy { jitter: 0.0, ..RetryPolicy::default() };
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
    }
}
