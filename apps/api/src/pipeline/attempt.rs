//! Stage attempt machine.
//!
//! ```text
//! Trying(p, n) ──retryable, n < max──▶ BackingOff(delay) ──▶ Trying(p, n+1)
//! Trying(p, n) ──retryable, n = max──▶ FallingOver(p+1) ──▶ Trying(p+1, 1)
//! Trying(p, n) ──auth / malformed────▶ FallingOver(p+1)
//! FallingOver past the end of the plan ▶ Exhausted
//! ```

use std::time::Duration;

use rand::Rng;

use crate::llm_client::CompletionError;

/// Upper bound on a provider-supplied `Retry-After`.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttemptState {
    /// Calling plan entry `provider`, 1-based `attempt`.
    Trying { provider: usize, attempt: u32 },
    /// Waiting before `attempt` against the same provider.
    BackingOff {
        provider: usize,
        attempt: u32,
        delay: Duration,
    },
    /// Moving to the next plan entry.
    FallingOver { next: usize },
    /// Plan used up.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    /// Fraction of the nominal delay added or removed at random.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Nominal delay before `attempt` (2-based: the first retry waits `base_delay`).
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2);
        self.base_delay * self.factor.saturating_pow(exponent)
    }

    pub fn delay(&self, attempt: u32, error: &CompletionError) -> Duration {
        if let CompletionError::RateLimited {
            retry_after: Some(secs),
        } = error
        {
            return Duration::from_secs(*secs).min(MAX_RETRY_AFTER);
        }
        let nominal = self.nominal_delay(attempt);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let scale = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        nominal.mul_f64(scale)
    }

    /// Next state after `attempt` against plan entry `provider` failed with `error`.
    pub fn on_failure(
        &self,
        provider: usize,
        attempt: u32,
        error: &CompletionError,
        plan_len: usize,
    ) -> AttemptState {
        if error.is_retryable() && attempt < self.max_attempts {
            let next = attempt + 1;
            return AttemptState::BackingOff {
                provider,
                attempt: next,
                delay: self.delay(next, error),
            };
        }
        if provider + 1 < plan_len {
            AttemptState::FallingOver { next: provider + 1 }
        } else {
            AttemptState::Exhausted
        }
    }
}
