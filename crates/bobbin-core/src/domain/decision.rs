//! Decision model: what happens to a job after a failed attempt.
//!
//! # Flow
//! 1. The worker turns the handler result into a [`JobError`]
//! 2. [`Decider::decide`] looks at the error kind and the retry budget
//! 3. `Retry` parks the job in the scheduled set with a backoff delay;
//!    `DeadLetter` marks it `failed`
//!
//! Kinds in [`NON_RETRYABLE_KINDS`] dead-letter on the first attempt.
//!
//! [`JobError`]: crate::domain::JobError

use std::time::Duration;

use super::job::Job;
use super::outcome::JobError;
use super::retry::RetryPolicy;

/// Error categories that are never retried automatically.
///
/// A missing tenant will not appear by waiting; retrying would just hot-loop.
/// Operators can still resurrect these jobs once the cause is fixed.
pub const NON_RETRYABLE_KINDS: &[&str] = &["TenantNotFoundError"];

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Reschedule after `delay`.
    Retry { delay: Duration, reason: String },

    /// Park the job in `failed`.
    DeadLetter { reason: String },
}

/// Decides the next action for a failed job.
///
/// Deciders are pure: the worker applies the decision to the store and queue.
pub trait Decider: Send + Sync {
    fn decide(&self, job: &Job, error: &JobError) -> Decision;
}

/// Retry while `retry_count < max_retries`, with [`RetryPolicy`] backoff.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, job: &Job, error: &JobError) -> Decision {
        if NON_RETRYABLE_KINDS.contains(&error.kind.as_str()) {
            return Decision::DeadLetter {
                reason: format!("{} is not retried automatically", error.kind),
            };
        }
        if !job.has_retries_left() {
            return Decision::DeadLetter {
                reason: format!("max retries reached: {}/{}", job.retry_count, job.max_retries),
            };
        }
        let delay = self.retry_policy.next_delay(job.retry_count);
        Decision::Retry {
            delay,
            reason: format!(
                "retry {}/{} after {:?}",
                job.retry_count + 1,
                job.max_retries,
                delay
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, JobInput};
    use chrono::Utc;
    use ulid::Ulid;

    fn job_with(retry_count: u32, max_retries: u32) -> Job {
        let now = Utc::now();
        let input = JobInput::new("x", serde_json::json!({})).with_max_retries(max_retries);
        let mut job = Job::new(JobId::from_ulid(Ulid::new()), input, 3, now, now);
        job.retry_count = retry_count;
        job
    }

    fn no_jitter() -> DefaultDecider {
        DefaultDecider::new(RetryPolicy { jitter: 0.0, ..RetryPolicy::default() })
    }

    #[test]
    fn retries_while_budget_left() {
        let decision = no_jitter().decide(&job_with(1, 3), &JobError::new("e", "HandlerError"));
        assert!(matches!(decision, Decision::Retry { delay, .. } if delay == Duration::from_secs(2)));
    }

    #[test]
    fn dead_letters_when_budget_exhausted() {
        let decision = no_jitter().decide(&job_with(2, 2), &JobError::new("e", "HandlerError"));
        assert!(matches!(decision, Decision::DeadLetter { .. }));
    }

    #[test]
    fn tenant_not_found_is_never_auto_retried() {
        let decision =
            no_jitter().decide(&job_with(0, 5), &JobError::new("gone", "TenantNotFoundError"));
        assert!(matches!(decision, Decision::DeadLetter { reason } if reason.contains("TenantNotFound")));
    }
}
