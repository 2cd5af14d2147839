//! Job state machine.
//!
//! `completed`, `failed` and `cancelled` are terminal for workers. Only the
//! operator retry leaves `failed`; nothing leaves the other two.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Retrying -> Pending (until max_retries)
/// - Pending -> Running -> Failed (retry budget exhausted, or tenant missing)
/// - Pending | Retrying -> Cancelled (never once a worker has claimed it)
/// - Failed -> Pending (operator retry only, see [`JobStatus::can_resurrect`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in a queue or in the scheduled set.
    Pending,

    /// Claimed by a worker; the handler is executing.
    Running,

    /// Failed, waiting in the scheduled set for its backoff to elapse.
    Retrying,

    /// Handler reported success.
    Completed,

    /// Dead letter.
    Failed,

    /// Cancelled before a worker claimed it.
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Retrying,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Is this a terminal state (no automatic transitions out)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Is the job supposed to sit in a queue or the scheduled set?
    pub fn is_waiting(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Retrying)
    }

    /// Transitions the engine performs on its own.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Retrying)
                | (Running, Failed)
                | (Retrying, Pending)
                | (Retrying, Cancelled)
        )
    }

    /// Operator-triggered `failed -> pending`.
    pub fn can_resurrect(self) -> bool {
        self == JobStatus::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::claim(JobStatus::Pending, JobStatus::Running)]
    #[case::cancel_pending(JobStatus::Pending, JobStatus::Cancelled)]
    #[case::succeed(JobStatus::Running, JobStatus::Completed)]
    #[case::retry(JobStatus::Running, JobStatus::Retrying)]
    #[case::dead_letter(JobStatus::Running, JobStatus::Failed)]
    #[case::promote(JobStatus::Retrying, JobStatus::Pending)]
    #[case::cancel_retrying(JobStatus::Retrying, JobStatus::Cancelled)]
    fn allowed_transitions(#[case] from: JobStatus, #[case] to: JobStatus) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case::rerun_completed(JobStatus::Completed, JobStatus::Running)]
    #[case::cancel_running(JobStatus::Running, JobStatus::Cancelled)]
    #[case::skip_claim(JobStatus::Pending, JobStatus::Completed)]
    #[case::run_from_retrying(JobStatus::Retrying, JobStatus::Running)]
    #[case::failed_auto_requeue(JobStatus::Failed, JobStatus::Pending)]
    #[case::uncancel(JobStatus::Cancelled, JobStatus::Pending)]
    fn rejected_transitions(#[case] from: JobStatus, #[case] to: JobStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn terminal_states_have_no_engine_transitions() {
        for from in JobStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in JobStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn only_failed_can_be_resurrected() {
        let resurrectable: Vec<_> = JobStatus::ALL
            .into_iter()
            .filter(|s| s.can_resurrect())
            .collect();
        assert_eq!(resurrectable, vec![JobStatus::Failed]);
    }

    #[test]
    fn serializes_snake_case() {
        let s = serde_json::to_string(&JobStatus::Retrying).unwrap();
        assert_eq!(s, "\"retrying\"");
    }
}
