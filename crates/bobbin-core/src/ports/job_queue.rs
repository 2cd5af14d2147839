//! JobQueue port: ready lanes per named queue plus the scheduled set.
//!
//! The queue holds job snapshots; status lives in the [`JobStore`]. A job is
//! in at most one holding structure at a time.
//!
//! # Invariants
//! - `dequeue` takes the highest priority lane first and is FIFO within a
//!   lane; two concurrent callers never get the same job
//! - re-adding a job that is already held moves it instead of duplicating it
//! - the scheduled set is ordered by `execute_at`, ties in insertion order
//! - `delete` is idempotent and touches both structures
//!
//! # Lifecycle
//! 1. `enqueue` (due now) or `schedule` (due later)
//! 2. `take_due` hands due entries to the promoter, which re-`enqueue`s them
//! 3. `dequeue` hands ready entries to a worker
//!
//! [`JobStore`]: crate::ports::JobStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{EngineError, Job, JobId};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add to `job.queue`'s ready set: priority first, FIFO within a priority.
    async fn enqueue(&self, job: Job) -> Result<(), EngineError>;

    /// Atomically remove and return the next ready job.
    /// Concurrent callers never receive the same job.
    async fn dequeue(&self, queue: &str) -> Result<Option<Job>, EngineError>;

    /// Same selection as [`dequeue`](Self::dequeue), without removal.
    async fn peek(&self, queue: &str) -> Result<Option<Job>, EngineError>;

    /// Remove from whichever structure holds the job. Idempotent: returns
    /// whether something was removed, never an error for an absent id.
    async fn delete(&self, id: JobId) -> Result<bool, EngineError>;

    /// Ready jobs in `queue`.
    async fn size(&self, queue: &str) -> Result<usize, EngineError>;

    async fn queue_names(&self) -> Result<Vec<String>, EngineError>;

    /// Park a job in the scheduled set, keyed by `job.execute_at`.
    async fn schedule(&self, job: Job) -> Result<(), EngineError>;

    async fn scheduled_size(&self) -> Result<usize, EngineError>;

    /// Remove and return every scheduled job with `execute_at <= now`,
    /// earliest first.
    async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>, EngineError>;

    /// Move due jobs straight into their ready lanes. Returns how many moved.
    ///
    /// This is the queue-only promotion; the engine's promoter also flips
    /// store status for retrying jobs, see `Engine::promote_due_jobs`.
    async fn promote_due_jobs(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let due = self.take_due(now).await?;
        let count = due.len();
        for job in due {
            self.enqueue(job).await?;
        }
        Ok(count)
    }
}
