//! Engine: the producer and operator surface.
//!
//! Cheap to clone; every collaborator sits behind an `Arc` and workers get
//! their own clone. There is no global state.
//!
//! # Operations
//! - **produce**: `enqueue`, `schedule`, `schedule_in`
//! - **inspect**: `get_status`, `find`, `status_counts`, `stats`, `list_failed`
//! - **operate**: `retry` (dead letters only), `cancel` (not yet claimed),
//!   `delete` (queue entry only), `purge` (record too)
//! - **run**: `spawn_pool`, `spawn_promoter`, `process_one`, `shutdown`
//!
//! Every job is saved to the store before it is enqueued or scheduled, so a
//! queue entry never points at a missing record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::promoter_loop::PromoterHandle;
use super::stats::{QueueStats, StatsAggregator};
use super::tenant_wrapper::TenantExecutor;
use super::worker_loop::{self, WorkStep, WorkerPool};
use crate::config::EngineConfig;
use crate::domain::{Decider, EngineError, Job, JobId, JobInput, JobStatus, Transition};
use crate::ports::{
    Clock, IdGenerator, JobFilter, JobQueue, JobStore, StatusCounts, TenantDirectory, TenantScope,
};
use crate::typed::HandlerRegistry;

#[derive(Clone)]
pub struct Engine {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) queue: Arc<dyn JobQueue>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) tenants: Arc<TenantExecutor>,
    pub(crate) decider: Arc<dyn Decider>,
    pub(crate) stats: Arc<StatsAggregator>,

    /// One signal for every pool and promoter spawned from this engine.
    shutdown: Arc<watch::Sender<bool>>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: EngineConfig,
        registry: HandlerRegistry,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        directory: Arc<dyn TenantDirectory>,
        scope: Arc<dyn TenantScope>,
        decider: Arc<dyn Decider>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            store,
            queue,
            clock,
            ids,
            tenants: Arc::new(TenantExecutor::new(directory, scope)),
            decider,
            stats: Arc::new(StatsAggregator::new()),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Enqueue a job that is due now.
    pub async fn enqueue(&self, input: JobInput) -> Result<JobId, EngineError> {
        let now = self.clock.now();
        self.submit(input, now, now).await
    }

    /// Enqueue a job that must not run before `at`. A past `at` is due now.
    pub async fn schedule(&self, input: JobInput, at: DateTime<Utc>) -> Result<JobId, EngineError> {
        let now = self.clock.now();
        self.submit(input, now, at).await
    }

    /// Enqueue a job due `delay` from now.
    pub async fn schedule_in(&self, input: JobInput, delay: Duration) -> Result<JobId, EngineError> {
        let now = self.clock.now();
        let delay = TimeDelta::from_std(delay)
            .map_err(|e| EngineError::Validation(format!("delay out of range: {e}")))?;
        self.submit(input, now, now + delay).await
    }

    async fn submit(
        &self,
        input: JobInput,
        now: DateTime<Utc>,
        execute_at: DateTime<Utc>,
    ) -> Result<JobId, EngineError> {
        input.validate()?;
        if self.config.strict_handlers && !self.registry.contains(&input.job_type) {
            return Err(EngineError::Validation(format!(
                "no handler registered for job_type={}",
                input.job_type
            )));
        }

        let job = Job::new(
            self.ids.generate_job_id(),
            input,
            self.config.default_max_retries,
            now,
            execute_at,
        );
        let id = job.id;
        self.store.save(job.clone()).await?;
        if job.is_due(now) {
            self.queue.enqueue(job).await?;
        } else {
            self.queue.schedule(job).await?;
        }
        debug!(job_id = %id, "job submitted");
        Ok(id)
    }

    pub async fn get_status(&self, id: JobId) -> Result<Job, EngineError> {
        self.store.find_by_id(id).await?.ok_or(EngineError::NotFound(id))
    }

    /// Dead letters, most recently failed first.
    pub async fn list_failed(&self, limit: usize) -> Result<Vec<Job>, EngineError> {
        self.store.failed_jobs(limit).await
    }

    /// Operator retry: `failed` back to `pending`, due now, `retry_count` kept.
    pub async fn retry(&self, id: JobId) -> Result<Job, EngineError> {
        let job = self.store.retry(id).await?;
        self.queue.enqueue(job.clone()).await?;
        info!(job_id = %id, retry_count = job.retry_count, "dead letter resubmitted");
        Ok(job)
    }

    /// Cancel a job no worker has claimed yet (`pending` or `retrying`).
    pub async fn cancel(&self, id: JobId) -> Result<Job, EngineError> {
        let job = self.store.update_status(id, Transition::Cancelled).await?;
        self.queue.delete(id).await?;
        info!(job_id = %id, "job cancelled");
        Ok(job)
    }

    /// Remove the job from the ready and scheduled structures only.
    pub async fn delete(&self, id: JobId) -> Result<bool, EngineError> {
        self.queue.delete(id).await
    }

    /// Remove every trace of the job, store record included.
    pub async fn purge(&self, id: JobId) -> Result<bool, EngineError> {
        let queued = self.queue.delete(id).await?;
        let stored = self.store.remove(id).await?;
        if stored {
            warn!(job_id = %id, "job purged");
        }
        Ok(queued || stored)
    }

    pub async fn find(&self, filter: &JobFilter) -> Result<Vec<Job>, EngineError> {
        self.store.find(filter).await
    }

    pub async fn status_counts(&self, queue: Option<&str>) -> Result<StatusCounts, EngineError> {
        self.store.count_by_status(queue).await
    }

    /// Move due scheduled jobs into their queues. Retrying jobs are set back
    /// to `pending` before they become visible to workers.
    ///
    /// `take_due` has already removed the entries, so each job is promoted on
    /// its own: one that fails goes back to the scheduled set for the next
    /// pass and the rest still move.
    pub async fn promote_due_jobs(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let due = self.queue.take_due(now).await?;
        let mut promoted = 0;

        for job in due {
            let id = job.id;
            match self.promote(&job).await {
                Ok(true) => promoted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(job_id = %id, error = %e, "promotion failed, keeping the job scheduled");
                    if let Err(e) = self.queue.schedule(job).await {
                        error!(job_id = %id, error = %e, "could not reschedule the job");
                    }
                }
            }
        }
        Ok(promoted)
    }

    /// Returns false for entries whose job was cancelled, finished or purged
    /// since it was scheduled.
    async fn promote(&self, job: &Job) -> Result<bool, EngineError> {
        let id = job.id;
        let ready = match self.store.find_by_id(id).await? {
            Some(stored) if stored.status == JobStatus::Retrying => {
                self.store.update_status(id, Transition::Pending).await?
            }
            Some(stored) if stored.status == JobStatus::Pending => stored,
            Some(stored) => {
                debug!(job_id = %id, status = %stored.status, "dropping stale scheduled entry");
                return Ok(false);
            }
            None => return Ok(false),
        };
        self.queue.enqueue(ready).await?;
        Ok(true)
    }

    /// Counters for one queue, or for all queues with `None`.
    ///
    /// `scheduled` is the size of the whole scheduled set.
    pub async fn stats(&self, queue: Option<&str>) -> Result<QueueStats, EngineError> {
        let size = match queue {
            Some(q) => self.queue.size(q).await?,
            None => {
                let mut total = 0;
                for q in self.queue.queue_names().await? {
                    total += self.queue.size(&q).await?;
                }
                total
            }
        };
        let scheduled = self.queue.scheduled_size().await?;
        Ok(self.stats.snapshot(queue, size, scheduled))
    }

    /// One dequeue-execute-settle step on `queue`. Pools call this in a loop;
    /// tests call it directly to drive jobs deterministically.
    pub async fn process_one(&self, queue: &str) -> Result<WorkStep, EngineError> {
        worker_loop::process_one(self, queue).await
    }

    /// Spawn `config.workers` workers over `config.queues`.
    pub fn spawn_pool(&self) -> WorkerPool {
        self.spawn_pool_on(self.config.workers, self.config.queues.clone())
    }

    pub fn spawn_pool_on(&self, workers: usize, queues: Vec<String>) -> WorkerPool {
        info!(workers, queues = ?queues, "starting worker pool");
        WorkerPool::spawn(
            self.clone(),
            workers,
            queues,
            Arc::clone(&self.shutdown),
            self.config.shutdown_timeout(),
        )
    }

    pub fn spawn_promoter(&self) -> PromoterHandle {
        PromoterHandle::spawn(
            self.clone(),
            self.config.promote_interval(),
            Arc::clone(&self.shutdown),
        )
    }

    /// Signal every pool and promoter of this engine to stop. One-way.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
