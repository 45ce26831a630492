//! Exponential backoff with optional jitter.

use rand::Rng;

/// Randomisation applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Return the computed delay exactly (deterministic).
    None,
    /// Uniform random integer in `[0, delay]`, spreading out retry storms.
    Full,
}

/// How a failing job is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before the job is terminally failed.
    pub max_attempts: u32,
    /// First-retry delay in seconds.
    pub base_secs: u64,
    /// Upper bound on any computed delay.
    pub cap_secs: u64,
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_secs: 60,
            cap_secs: 3600,
            jitter: Jitter::Full,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_secs: u64, cap_secs: u64, jitter: Jitter) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_secs,
            cap_secs,
            jitter,
        }
    }

    /// Delay in seconds before retry number `attempt` (1-based):
    /// `min(cap, base * 2^(attempt-1))`, then jitter.
    pub fn backoff_delay(&self, attempt: u32) -> u64 {
        let exp = attempt.max(1) - 1;
        let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        let raw = self.base_secs.saturating_mul(factor).min(self.cap_secs);
        match self.jitter {
            Jitter::None => raw,
            Jitter::Full => rand::rng().random_range(0..=raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::new(10, 2, 60, Jitter::None);
        let delays: Vec<u64> = (1..=7).map(|a| policy.backoff_delay(a)).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn huge_attempt_numbers_saturate_instead_of_overflowing() {
        let policy = RetryPolicy::new(10, 2, 600, Jitter::None);
        assert_eq!(policy.backoff_delay(80), 600);
        assert_eq!(policy.backoff_delay(u32::MAX), 600);
    }

    #[test]
    fn attempt_zero_is_treated_as_the_first_attempt() {
        let policy = RetryPolicy::new(10, 5, 60, Jitter::None);
        assert_eq!(policy.backoff_delay(0), 5);
        assert_eq!(policy.backoff_delay(1), 5);
    }

    #[test]
    fn full_jitter_stays_within_the_computed_delay() {
        let policy = RetryPolicy::new(10, 8, 64, Jitter::Full);
        for attempt in 1..=8 {
            let raw = RetryPolicy::new(10, 8, 64, Jitter::None).backoff_delay(attempt);
            for _ in 0..50 {
                assert!(policy.backoff_delay(attempt) <= raw);
            }
        }
    }

    #[test]
    fn max_attempts_is_clamped_to_at_least_one() {
        assert_eq!(RetryPolicy::new(0, 1, 1, Jitter::None).max_attempts, 1);
    }
}
