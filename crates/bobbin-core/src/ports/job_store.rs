//! JobStore port: the durable record of every job.
//!
//! The store is the source of truth for status, retry count and dead letters.
//! It owns the transition rules: callers describe what happened with a
//! [`Transition`] and never write `retry_count` or timestamps themselves.
//!
//! # Design rules
//! - `update_status` validates and applies in one step; a rejected transition
//!   leaves the record untouched
//! - claims are made here (`pending -> running`), so two workers holding the
//!   same snapshot cannot both run it
//! - `failed_jobs` is the dead-letter view, most recently failed first
//! - `retry` is the operator path out of `failed` and keeps `retry_count`

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{EngineError, Job, JobId, JobStatus, Transition};

/// Conjunctive filter; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub queue: Option<String>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.job_type.as_deref().is_none_or(|t| job.job_type == t)
            && self.queue.as_deref().is_none_or(|q| job.queue == q)
    }
}

/// Number of jobs per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts(pub HashMap<JobStatus, usize>);

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> usize {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn add(&mut self, status: JobStatus) {
        *self.0.entry(status).or_default() += 1;
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upsert. The first save establishes the durable record.
    async fn save(&self, job: Job) -> Result<(), EngineError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, EngineError>;

    /// Apply a transition atomically for this job id and return the new record.
    ///
    /// Fails with `NotFound` for an unknown id and `InvalidTransition` when the
    /// state machine forbids the move; neither case changes the stored job.
    async fn update_status(&self, id: JobId, transition: Transition) -> Result<Job, EngineError>;

    /// Matching jobs in creation order.
    async fn find(&self, filter: &JobFilter) -> Result<Vec<Job>, EngineError>;

    /// Dead letters, most recently failed first.
    async fn failed_jobs(&self, limit: usize) -> Result<Vec<Job>, EngineError>;

    /// Operator retry: `failed -> pending`, due now, `retry_count` unchanged.
    async fn retry(&self, id: JobId) -> Result<Job, EngineError>;

    async fn count_by_status(&self, queue: Option<&str>) -> Result<StatusCounts, EngineError>;

    /// Hard delete, operator use only. Returns whether a record existed.
    async fn remove(&self, id: JobId) -> Result<bool, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobInput;
    use chrono::Utc;
    use ulid::Ulid;

    #[test]
    fn filter_fields_are_conjunctive() {
        let now = Utc::now();
        let input = JobInput::new("send-email", serde_json::json!({})).on_queue("mail");
        let job = Job::new(JobId::from_ulid(Ulid::new()), input, 3, now, now);

        assert!(JobFilter::new().matches(&job));
        assert!(JobFilter::new().queue("mail").job_type("send-email").matches(&job));
        assert!(!JobFilter::new().queue("mail").job_type("other").matches(&job));
        assert!(!JobFilter::new().status(JobStatus::Failed).matches(&job));
    }
}
