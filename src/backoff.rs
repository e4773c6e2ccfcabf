//! Jittered exponential delay between connect attempts.
//!
//! A connect cycle is bounded by the retry count, not by wall-clock time, so
//! the state machine only paces attempts. A fresh state is created for every
//! cycle.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::BackoffPolicy;

const MIN_SLEEP_MS: u64 = 10;

/// Produces jittered delays that double up to the policy cap.
pub(crate) struct BackoffState {
    policy: BackoffPolicy,
    current: Duration,
    rng: StdRng,
}

impl BackoffState {
    /// Create a new state machine from the supplied policy.
    pub(crate) fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base,
            rng: StdRng::from_entropy(),
            policy,
        }
    }

    #[cfg(test)]
    fn seeded(policy: BackoffPolicy, seed: u64) -> Self {
        Self {
            current: policy.base,
            rng: StdRng::seed_from_u64(seed),
            policy,
        }
    }

    /// Delay to wait before the next attempt.
    pub(crate) fn next_sleep(&mut self) -> Duration {
        let max_ms = u64::try_from(self.current.as_millis()).unwrap_or(u64::MAX);
        self.current = self.current.saturating_mul(2).min(self.policy.cap);
        let sleep_ms = match max_ms {
            0 => MIN_SLEEP_MS,
            1..=MIN_SLEEP_MS => max_ms,
            _ => self.rng.gen_range(MIN_SLEEP_MS..=max_ms),
        };
        Duration::from_millis(sleep_ms)
    }
}
