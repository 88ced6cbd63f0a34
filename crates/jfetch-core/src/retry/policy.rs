use std::time::Duration;

use crate::outcome::{FailureClass, FetchOutcome};

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt succeeded; finalize the job as succeeded.
    Succeed,
    /// Permanent failure or attempts exhausted; finalize as failed.
    Fail,
    /// Transient failure with attempts remaining; retry after the delay.
    RetryAfter(Duration),
}

/// Run-wide retry parameters. The policy itself is pure: the same attempt
/// number and outcome always produce the same decision.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts per job (including the first).
    pub max_attempts: u32,
    /// Delay before retrying an ordinary transient failure.
    pub base_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decides what to do after attempt `attempt` (1-based) produced `outcome`.
    ///
    /// A 404 is permanent and fails immediately regardless of remaining
    /// attempts. Rate limiting (429) backs off twice as hard for each
    /// consecutive throttled attempt: base, 2x base, 4x base, capped at
    /// `max_delay`. Every other failure class retries on the flat base delay
    /// until attempts run out.
    pub fn decide(&self, attempt: u32, outcome: &FetchOutcome) -> RetryDecision {
        let class = match outcome {
            FetchOutcome::Success => return RetryDecision::Succeed,
            FetchOutcome::Failure { class, .. } => class,
        };

        if *class == FailureClass::NotFound {
            return RetryDecision::Fail;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Fail;
        }

        match class {
            FailureClass::RateLimited => {
                let exp = 1u32 << attempt.saturating_sub(1).min(8);
                let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
                RetryDecision::RetryAfter(delay)
            }
            _ => RetryDecision::RetryAfter(self.base_delay),
        }
    }
}
