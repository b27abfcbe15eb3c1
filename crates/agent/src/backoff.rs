//! Exponential backoff with symmetric jitter.

use escapist_config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// `min(base * 2^attempt, max)`, then scaled by a uniform factor in
/// `[1 - jitter, 1 + jitter)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base_secs: f64,
    max_secs: f64,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base_secs: base.as_secs_f64(),
            max_secs: max.as_secs_f64(),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_secs: config.base_delay_secs.max(0.0),
            max_secs: config.max_delay_secs.max(0.0),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// The un-jittered delay for `attempt` (0-based).
    pub fn nominal(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(1023) as i32);
        Duration::from_secs_f64((self.base_secs * factor).min(self.max_secs))
    }

    /// The delay to wait before retry number `attempt + 1`.
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal(attempt).as_secs_f64();
        let spread: f64 = rng.gen_range(-1.0..1.0);
        let factor = 1.0 + self.jitter * spread;
        Duration::from_secs_f64((nominal * factor).max(0.0))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn delay_stays_within_jitter_band() {
        let backoff = Backoff::default();
        let mut rng = StdRng::seed_from_u64(7);

        for attempt in 0..=10u32 {
            let nominal = (60.0 * 2f64.powi(attempt as i32)).min(300.0);
            for _ in 0..200 {
                let d = backoff.delay(attempt, &mut rng).as_secs_f64();
                assert!(d >= 0.75 * nominal - 1e-9, "attempt {attempt}: {d} < {}", 0.75 * nominal);
                assert!(d <= 1.25 * nominal + 1e-9, "attempt {attempt}: {d} > {}", 1.25 * nominal);
            }
        }
    }

    #[test]
    fn nominal_doubles_then_clamps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.nominal(0), Duration::from_secs(60));
        assert_eq!(backoff.nominal(1), Duration::from_secs(120));
        assert_eq!(backoff.nominal(2), Duration::from_secs(240));
        assert_eq!(backoff.nominal(3), Duration::from_secs(300));
        assert_eq!(backoff.nominal(10), backoff.nominal(3));
        assert_eq!(backoff.nominal(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn mean_delay_is_non_decreasing() {
        let backoff = Backoff::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mean = |attempt: u32, rng: &mut StdRng| {
            (0..500)
                .map(|_| backoff.delay(attempt, rng).as_secs_f64())
                .sum::<f64>()
                / 500.0
        };

        let means: Vec<f64> = (0..6).map(|a| mean(a, &mut rng)).collect();
        for pair in means.windows(2) {
            // Past the cap both means estimate 300s; allow sampling noise.
            assert!(pair[1] >= pair[0] - 10.0, "{means:?}");
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(backoff.delay(0, &mut rng), Duration::from_secs(1));
        assert_eq!(backoff.delay(2, &mut rng), Duration::from_secs(4));
        assert_eq!(backoff.delay(5, &mut rng), Duration::from_secs(10));
    }

    #[test]
    fn same_seed_same_delays() {
        let backoff = Backoff::default();
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        for attempt in 0..5 {
            assert_eq!(backoff.delay(attempt, &mut a), backoff.delay(attempt, &mut b));
        }
    }
}
