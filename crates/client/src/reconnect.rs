//! Bounded linear-backoff reconnection policy.
//!
//! The delay before attempt `n` is `base_delay * n`, clamped to
//! `max_delay`. After `max_attempts` failed attempts the policy gives up
//! and the manager reports exhaustion instead of retrying forever.

use std::time::Duration;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay unit; attempt `n` waits `n` units.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Failed attempts tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given (1-based) attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }
}

/// Attempt counter of one connection manager.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconnectState {
    attempt: u32,
}

impl ReconnectState {
    /// Record a failed or aborted attempt and return the delay before the
    /// next one, or `None` once the policy's ceiling is exceeded.
    pub fn next(&mut self, policy: &ReconnectPolicy) -> Option<Duration> {
        if self.attempt >= policy.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(policy.delay_for(self.attempt))
    }

    /// Forget past failures after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_linearly() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
    }

    #[test]
    fn delay_clamps_at_max() {
        let policy = ReconnectPolicy {
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(8), Duration::from_secs(5));
    }

    #[test]
    fn full_backoff_sequence_is_non_decreasing_then_exhausts() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(7),
            max_attempts: 5,
        };
        let mut state = ReconnectState::default();

        let delays: Vec<u64> = std::iter::from_fn(|| state.next(&policy))
            .map(|d| d.as_secs())
            .collect();

        assert_eq!(delays, vec![2, 4, 6, 7, 7]);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(state.next(&policy), None);
        assert_eq!(state.attempt(), 5);
    }

    #[test]
    fn reset_starts_over() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::default();
        state.next(&policy);
        state.next(&policy);

        state.reset();

        assert_eq!(state.next(&policy), Some(policy.base_delay));
    }

    #[test]
    fn zero_attempts_gives_up_immediately() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(ReconnectState::default().next(&policy), None);
    }
}
