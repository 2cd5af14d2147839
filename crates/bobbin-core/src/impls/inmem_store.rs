//! In-memory job store.
//!
//! One `RwLock` over the whole map: reads (`find`, counts, dead letters) run
//! in parallel, and every transition is applied to a clone and swapped in
//! under the write lock, so readers never see a half-applied transition.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{EngineError, Job, JobId, JobStatus, Transition};
use crate::ports::{Clock, JobFilter, JobStore, StatusCounts};

#[derive(Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,

    /// Ids in first-save order; gives `find` its stable ordering.
    order: Vec<JobId>,
}

/// Process-local [`JobStore`].
///
/// A single lock makes `update_status` atomic per job. The lock is never held
/// across an await.
pub struct InMemoryJobStore {
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: Job) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        if !state.jobs.contains_key(&job.id) {
            state.order.push(job.id);
        }
        state.jobs.insert(job.id, job);
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, EngineError> {
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn update_status(&self, id: JobId, transition: Transition) -> Result<Job, EngineError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let job = state.jobs.get_mut(&id).ok_or(EngineError::NotFound(id))?;

        // Work on a copy so a rejected transition leaves the record untouched.
        let mut next = job.clone();
        next.apply(transition, now)?;
        *job = next.clone();
        Ok(next)
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<Job>, EngineError> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| filter.matches(job))
            .cloned()
            .collect())
    }

    async fn failed_jobs(&self, limit: usize) -> Result<Vec<Job>, EngineError> {
        let mut failed = self.find(&JobFilter::new().status(JobStatus::Failed)).await?;
        // stable sort: ties keep creation order
        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        failed.truncate(limit);
        Ok(failed)
    }

    async fn retry(&self, id: JobId) -> Result<Job, EngineError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let job = state.jobs.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        job.resurrect(now)?;
        Ok(job.clone())
    }

    async fn count_by_status(&self, queue: Option<&str>) -> Result<StatusCounts, EngineError> {
        let state = self.state.read().await;
        let mut counts = StatusCounts::default();
        for job in state.jobs.values() {
            if queue.is_none_or(|q| job.queue == q) {
                counts.add(job.status);
            }
        }
        Ok(counts)
    }

    async fn remove(&self, id: JobId) -> Result<bool, EngineError> {
        let mut state = self.state.write().await;
        let existed = state.jobs.remove(&id).is_some();
        if existed {
            state.order.retain(|other| *other != id);
        }
        Ok(existed)
    }
}
