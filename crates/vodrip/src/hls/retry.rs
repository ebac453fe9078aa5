// Segment retry policy: how many times a failed segment goes back on the
// queue and how long a worker backs off before requeueing it.

use rand::RngExt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per segment, first one included. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Base delay. Actual delay = base * 2^attempt (+ jitter), capped at `max_delay`.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Adds a random [0, base_delay/2) component so workers do not retry in lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(8),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Requeue forever without waiting.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Whether a segment that already failed `attempts_made` times may be tried again.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }

    /// Delay before requeueing after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if !self.jitter {
            return backoff;
        }

        // Jitter only fills the room left under the cap.
        let headroom = self.max_delay.saturating_sub(backoff).min(self.base_delay / 2);
        let spread_ms = u64::try_from(headroom.as_millis()).unwrap_or(u64::MAX);
        if spread_ms == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::rng().random_range(0..spread_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: Some(3),
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter: false,
        }
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = fixed(10, 100);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn unbounded_policy_never_gives_up() {
        let policy = RetryPolicy::unbounded();
        assert!(policy.allows_retry(u32::MAX));
        assert_eq!(policy.delay_for_attempt(5), Duration::ZERO);
    }

    #[test]
    fn delay_without_jitter_is_exponential() {
        let policy = fixed(100, 10_000);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn delay_respects_max_cap() {
        let policy = fixed(500, 5_000);
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..fixed(100, 10_000)
        };
        for _ in 0..32 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(150));
        }

        let capped = RetryPolicy {
            jitter: true,
            ..fixed(500, 1_000)
        };
        for _ in 0..32 {
            assert!(capped.delay_for_attempt(10) <= Duration::from_secs(1));
        }
    }
}
