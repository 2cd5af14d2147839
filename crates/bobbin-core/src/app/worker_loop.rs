//! Worker pool and the per-job processing step.
//!
//! # Flow
//! 1. `JobQueue::dequeue()` the next ready job
//! 2. Look up the handler. A job without one is set aside and the worker
//!    dequeues again, so it never hides runnable jobs queued behind it
//! 3. Set-aside jobs go back to their lanes (back off only if nothing ran)
//! 4. `JobStore::update_status(Running)` claims the job
//! 5. Bind tenant scope, run the handler on its own task
//! 6. Success: `completed`. Failure: `Decider` picks retry or dead letter
//!
//! # Shutdown
//! - the shared watch signal stops every worker from dequeuing
//! - workers still inside a handler at the deadline are aborted
//! - each pool tracks the jobs its workers hold; after the join, a
//!   `running` leftover becomes `failed` with `type: "Aborted"` (operator
//!   retry applies) and a `pending` one goes back to its lane

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::engine::Engine;
use crate::domain::{
    Decision, EngineError, ExecutionContext, Job, JobError, JobId, JobStatus, Outcome, Transition,
};
use crate::typed::DynHandler;

/// What one call to [`Engine::process_one`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkStep {
    /// Queue was empty.
    Idle,

    /// Nothing runnable: every ready job lacks a handler. Carries the first
    /// one; all of them went back to their lanes untouched.
    Deferred(JobId),

    /// The claim was refused (cancelled or purged meanwhile).
    Skipped(JobId),

    /// Attempt finished; the job as stored afterwards.
    Done(Job),
}

/// Aborts the handler task if the worker itself is aborted mid-call.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "handler task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Run the handler on a separate task so a panic is contained.
async fn invoke(
    handler: Arc<dyn DynHandler>,
    args: serde_json::Value,
    ctx: ExecutionContext,
) -> Result<Outcome, EngineError> {
    let mut task = AbortOnDrop(tokio::spawn(async move { handler.handle_dyn(args, &ctx).await }));
    match (&mut task.0).await {
        Ok(result) => result,
        Err(join_err) => Ok(Outcome::failure_of(panic_message(join_err), "Panic")),
    }
}

/// Jobs a pool's workers took off the queue and have not settled yet.
#[derive(Clone, Default)]
pub(crate) struct InFlight(Arc<Mutex<HashSet<JobId>>>);

impl InFlight {
    async fn track(&self, id: JobId) {
        self.0.lock().await.insert(id);
    }

    async fn release(&self, id: JobId) {
        self.0.lock().await.remove(&id);
    }

    async fn drain(&self) -> Vec<JobId> {
        self.0.lock().await.drain().collect()
    }
}

pub(crate) async fn process_one(engine: &Engine, queue: &str) -> Result<WorkStep, EngineError> {
    step(engine, queue, &InFlight::default()).await
}

async fn step(engine: &Engine, queue: &str, in_flight: &InFlight) -> Result<WorkStep, EngineError> {
    let mut deferred = Vec::new();
    let next = loop {
        let job = match engine.queue.dequeue(queue).await {
            Ok(Some(job)) => job,
            Ok(None) => break None,
            Err(e) => {
                put_back(engine, in_flight, deferred).await;
                return Err(e);
            }
        };
        in_flight.track(job.id).await;
        match engine.registry.get(&job.job_type) {
            Some(handler) => break Some((job, handler)),
            None => {
                warn!(job_id = %job.id, job_type = %job.job_type, queue, "no handler registered, deferring");
                deferred.push(job);
            }
        }
    };
    let first_deferred = deferred.first().map(|job| job.id);
    put_back(engine, in_flight, deferred).await;

    let Some((job, handler)) = next else {
        return Ok(first_deferred.map_or(WorkStep::Idle, WorkStep::Deferred));
    };
    let id = job.id;

    let claimed = match engine.store.update_status(id, Transition::Running).await {
        Ok(claimed) => claimed,
        Err(e @ (EngineError::InvalidTransition { .. } | EngineError::NotFound(_))) => {
            warn!(job_id = %id, error = %e, "claim refused, skipping");
            in_flight.release(id).await;
            return Ok(WorkStep::Skipped(id));
        }
        Err(e) => {
            put_back(engine, in_flight, vec![job]).await;
            return Err(e);
        }
    };
    debug!(job_id = %id, job_type = %claimed.job_type, retry_count = claimed.retry_count, "job running");

    let ctx = ExecutionContext::for_job(&claimed);
    let args = claimed.args.clone();
    let started = Instant::now();
    let result = engine
        .tenants
        .execute(ctx, claimed.tenant_id(), |scoped| invoke(handler, args, scoped))
        .await;
    let elapsed = started.elapsed();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => Outcome::failure_of(e.to_string(), e.kind_name()),
    };
    engine.stats.record(&claimed.queue, outcome.is_success(), elapsed);

    // a failed settle keeps the id tracked; pool shutdown recovers it
    let finished = if outcome.is_success() {
        match engine
            .store
            .update_status(id, Transition::Completed { result: outcome.result })
            .await
        {
            Ok(job) => {
                info!(job_id = %id, job_type = %job.job_type, elapsed_ms = elapsed.as_millis() as u64, "job completed");
                job
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "could not record completion");
                return Err(e);
            }
        }
    } else {
        let error = outcome.error_or_default();
        settle_failure(engine, &claimed, error).await?
    };
    in_flight.release(id).await;
    Ok(WorkStep::Done(finished))
}

async fn settle_failure(engine: &Engine, claimed: &Job, error: JobError) -> Result<Job, EngineError> {
    let id = claimed.id;
    match engine.decider.decide(claimed, &error) {
        Decision::Retry { delay, reason } => {
            warn!(job_id = %id, error_type = %error.kind, error = %error.message, %reason, "job failed, retrying");
            let job = engine
                .store
                .update_status(id, Transition::Retrying { error, delay })
                .await?;
            match engine.queue.schedule(job.clone()).await {
                Ok(()) => Ok(job),
                Err(e) => {
                    // skip the backoff rather than strand a retrying job
                    warn!(job_id = %id, error = %e, "could not schedule retry, requeueing now");
                    let pending = engine.store.update_status(id, Transition::Pending).await?;
                    engine.queue.enqueue(pending.clone()).await?;
                    Ok(pending)
                }
            }
        }
        Decision::DeadLetter { reason } => {
            error!(job_id = %id, error_type = %error.kind, error = %error.message, %reason, "job dead-lettered");
            engine.store.update_status(id, Transition::Failed { error }).await
        }
    }
}

/// Return set-aside jobs to their lanes. When the enqueue fails the job is
/// parked in the scheduled set; it is already due, so the next promotion
/// pass moves it back.
async fn put_back(engine: &Engine, in_flight: &InFlight, jobs: Vec<Job>) {
    for job in jobs {
        let id = job.id;
        let restored = match engine.queue.enqueue(job.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(job_id = %id, error = %e, "requeue failed, parking in the scheduled set");
                engine.queue.schedule(job).await
            }
        };
        match restored {
            Ok(()) => in_flight.release(id).await,
            Err(e) => error!(job_id = %id, error = %e, "job could not be returned to the queue"),
        }
    }
}

/// Settle a job a stopped worker left behind. Returns whether anything changed.
/// - `running`: the attempt was interrupted, dead-letter it as `Aborted`
/// - `pending`: taken off the queue but never claimed, put it back
async fn recover(engine: &Engine, id: JobId) -> Result<bool, EngineError> {
    let Some(job) = engine.store.find_by_id(id).await? else {
        return Ok(false);
    };
    match job.status {
        JobStatus::Running => {
            let error = JobError::new("worker stopped before the attempt was settled", ABORTED);
            engine.store.update_status(id, Transition::Failed { error }).await?;
            warn!(job_id = %id, job_type = %job.job_type, "interrupted job marked failed");
            Ok(true)
        }
        JobStatus::Pending => {
            engine.queue.enqueue(job).await?;
            debug!(job_id = %id, "interrupted job returned to its queue");
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// `error.type` of a job whose attempt was cut short by pool shutdown.
pub const ABORTED: &str = "Aborted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that stopped on their own before the deadline.
    pub finished: usize,
    /// Workers aborted at the deadline.
    pub aborted: usize,
    /// Interrupted jobs settled after the join.
    pub recovered: usize,
}

/// Worker pool handle.
/// - every worker polls `queues` in order and restarts from the first after a job
/// - `shutdown_and_join()` stops dequeuing and waits out in-flight handlers
pub struct WorkerPool {
    engine: Engine,
    shutdown: Arc<watch::Sender<bool>>,
    joins: Vec<JoinHandle<()>>,
    in_flight: InFlight,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub(crate) fn spawn(
        engine: Engine,
        workers: usize,
        queues: Vec<String>,
        shutdown: Arc<watch::Sender<bool>>,
        shutdown_timeout: Duration,
    ) -> Self {
        let queues: Arc<[String]> = queues.into();
        let in_flight = InFlight::default();
        let joins = (0..workers)
            .map(|worker| {
                let engine = engine.clone();
                let queues = Arc::clone(&queues);
                let in_flight = in_flight.clone();
                let rx = shutdown.subscribe();
                tokio::spawn(
                    worker_loop(engine, queues, in_flight, rx).instrument(info_span!("worker", worker)),
                )
            })
            .collect();

        Self {
            engine,
            shutdown,
            joins,
            in_flight,
            shutdown_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Ask every worker (and the promoter sharing this signal) to stop.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Stop dequeuing, wait up to the shutdown timeout, abort the rest, then
    /// settle every job the stopped workers still held.
    pub async fn shutdown_and_join(self) -> ShutdownReport {
        self.request_shutdown();
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let mut report = ShutdownReport {
            finished: 0,
            aborted: 0,
            recovered: 0,
        };

        for mut join in self.joins {
            match tokio::time::timeout_at(deadline, &mut join).await {
                Ok(_) => report.finished += 1,
                Err(_) => {
                    join.abort();
                    // the worker must be gone before its job is touched
                    let _ = join.await;
                    report.aborted += 1;
                }
            }
        }
        if report.aborted > 0 {
            warn!(aborted = report.aborted, "workers aborted after shutdown timeout");
        }

        for id in self.in_flight.drain().await {
            match recover(&self.engine, id).await {
                Ok(true) => report.recovered += 1,
                Ok(false) => {}
                Err(e) => error!(job_id = %id, error = %e, "could not recover interrupted job"),
            }
        }
        info!(finished = report.finished, recovered = report.recovered, "worker pool stopped");
        report
    }
}

async fn worker_loop(
    engine: Engine,
    queues: Arc<[String]>,
    in_flight: InFlight,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let poll_interval = engine.config.poll_interval();
    debug!(queues = ?queues, "worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let mut worked = false;
        for queue in queues.iter() {
            match step(&engine, queue, &in_flight).await {
                Ok(WorkStep::Done(_)) | Ok(WorkStep::Skipped(_)) => {
                    worked = true;
                    break;
                }
                Ok(WorkStep::Idle) | Ok(WorkStep::Deferred(_)) => {}
                Err(e) => error!(queue = %queue, error = %e, "worker step failed"),
            }
        }
        if worked {
            continue;
        }

        // idle: sleep, but wake immediately on shutdown
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    debug!("worker stopped");
}
