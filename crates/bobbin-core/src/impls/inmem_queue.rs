//! In-memory job queue: four FIFO lanes per queue name plus a scheduled heap.
//!
//! # Layout
//! - `queues`: queue name -> one `VecDeque` per priority, critical first
//! - `scheduled`: min-heap on `(execute_at, seq)`
//! - `slots`: job id -> where the job currently sits
//!
//! Heap entries cannot be removed in place. `delete` drops the slot and the
//! stale heap entry is skipped when it surfaces (its `seq` no longer matches).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{EngineError, Job, JobId, Priority};
use crate::ports::JobQueue;

/// Scheduled entry for the min-heap (earliest `execute_at` first, then
/// insertion order).
#[derive(Debug)]
struct ScheduledEntry {
    execute_at: DateTime<Utc>,
    seq: u64,
    job: Job,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .execute_at
            .cmp(&self.execute_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One lane per priority, indexed by [`Priority::rank`].
#[derive(Debug, Default)]
struct Lanes([VecDeque<Job>; 4]);

impl Lanes {
    fn push(&mut self, job: Job) {
        self.0[job.priority.rank()].push_back(job);
    }

    fn pop(&mut self) -> Option<Job> {
        self.0.iter_mut().find_map(VecDeque::pop_front)
    }

    fn front(&self) -> Option<&Job> {
        self.0.iter().find_map(VecDeque::front)
    }

    fn remove(&mut self, id: JobId, priority: Priority) -> bool {
        let lane = &mut self.0[priority.rank()];
        let before = lane.len();
        lane.retain(|job| job.id != id);
        lane.len() != before
    }

    fn len(&self) -> usize {
        self.0.iter().map(VecDeque::len).sum()
    }
}

/// Where a job currently sits.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Ready { queue: String, priority: Priority },
    /// `seq` identifies the live heap entry; older entries are tombstones.
    Scheduled { seq: u64 },
}

#[derive(Debug, Default)]
struct InMemoryQueueState {
    queues: BTreeMap<String, Lanes>,

    /// Lazily pruned: entries whose slot no longer matches are skipped.
    scheduled: BinaryHeap<ScheduledEntry>,

    slots: HashMap<JobId, Slot>,
    scheduled_live: usize,
    next_seq: u64,
}

impl InMemoryQueueState {
    fn remove(&mut self, id: JobId) -> bool {
        match self.slots.remove(&id) {
            Some(Slot::Ready { queue, priority }) => self
                .queues
                .get_mut(&queue)
                .is_some_and(|lanes| lanes.remove(id, priority)),
            Some(Slot::Scheduled { .. }) => {
                self.scheduled_live -= 1;
                true
            }
            None => false,
        }
    }

    fn push_ready(&mut self, job: Job) {
        self.remove(job.id);
        self.slots.insert(
            job.id,
            Slot::Ready {
                queue: job.queue.clone(),
                priority: job.priority,
            },
        );
        self.queues.entry(job.queue.clone()).or_default().push(job);
    }

    fn push_scheduled(&mut self, job: Job) {
        self.remove(job.id);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(job.id, Slot::Scheduled { seq });
        self.scheduled_live += 1;
        self.scheduled.push(ScheduledEntry {
            execute_at: job.execute_at,
            seq,
            job,
        });
    }

    fn pop_ready(&mut self, queue: &str) -> Option<Job> {
        let job = self.queues.get_mut(queue)?.pop()?;
        self.slots.remove(&job.id);
        Some(job)
    }

    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<Job> {
        let mut due = Vec::new();
        while let Some(entry) = self.scheduled.peek() {
            if entry.execute_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            let live = matches!(
                self.slots.get(&entry.job.id),
                Some(Slot::Scheduled { seq }) if *seq == entry.seq
            );
            if live {
                self.slots.remove(&entry.job.id);
                self.scheduled_live -= 1;
                due.push(entry.job);
            }
        }
        due
    }
}

/// Process-local [`JobQueue`]. One mutex guards all lanes, so "select and
/// remove" in `dequeue` is a single critical section.
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Mutex<InMemoryQueueState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_enqueueable(job: &Job) -> Result<(), EngineError> {
    if job.job_type.trim().is_empty() {
        return Err(EngineError::Validation(format!("{}: job_type is empty", job.id)));
    }
    if job.queue.trim().is_empty() {
        return Err(EngineError::Validation(format!("{}: queue is empty", job.id)));
    }
    Ok(())
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), EngineError> {
        check_enqueueable(&job)?;
        self.state.lock().await.push_ready(job);
        Ok(())
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<Job>, EngineError> {
        Ok(self.state.lock().await.pop_ready(queue))
    }

    async fn peek(&self, queue: &str) -> Result<Option<Job>, EngineError> {
        let state = self.state.lock().await;
        Ok(state.queues.get(queue).and_then(Lanes::front).cloned())
    }

    async fn delete(&self, id: JobId) -> Result<bool, EngineError> {
        Ok(self.state.lock().await.remove(id))
    }

    async fn size(&self, queue: &str) -> Result<usize, EngineError> {
        let state = self.state.lock().await;
        Ok(state.queues.get(queue).map_or(0, Lanes::len))
    }

    async fn queue_names(&self) -> Result<Vec<String>, EngineError> {
        let state = self.state.lock().await;
        Ok(state.queues.keys().cloned().collect())
    }

    async fn schedule(&self, job: Job) -> Result<(), EngineError> {
        check_enqueueable(&job)?;
        self.state.lock().await.push_scheduled(job);
        Ok(())
    }

    async fn scheduled_size(&self) -> Result<usize, EngineError> {
        Ok(self.state.lock().await.scheduled_live)
    }

    async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>, EngineError> {
        Ok(self.state.lock().await.take_due(now))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::domain::JobInput;
    use chrono::{TimeDelta, TimeZone};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn job(queue: &str, priority: Priority) -> Job {
        let input = JobInput::new("test", serde_json::json!({}))
            .on_queue(queue)
            .with_priority(priority);
        Job::new(JobId::from_ulid(Ulid::new()), input, 3, t0(), t0())
    }

    fn job_at(execute_at: DateTime<Utc>) -> Job {
        let mut job = job("default", Priority::Normal);
        job.execute_at = execute_at;
        job
    }

    #[tokio::test]
    async fn dequeues_by_priority() {
        let queue = InMemoryJobQueue::new();
        for p in [Priority::Low, Priority::Normal, Priority::High, Priority::Critical] {
            queue.enqueue(job("default", p)).await.unwrap();
        }

        let mut order = Vec::new();
        while let Some(job) = queue.dequeue("default").await.unwrap() {
            order.push(job.priority);
        }
        assert_eq!(
            order,
            vec![Priority::Critical, Priority::High, Priority::Normal, Priority::Low]
        );
    }

    #[tokio::test]
    async fn fifo_within_priority() {
        let queue = InMemoryJobQueue::new();
        let a = job("default", Priority::Normal);
        let b = job("default", Priority::Normal);
        queue.enqueue(a.clone()).await.unwrap();
        queue.enqueue(b.clone()).await.unwrap();

        assert_eq!(queue.dequeue("default").await.unwrap().unwrap().id, a.id);
        assert_eq!(queue.dequeue("default").await.unwrap().unwrap().id, b.id);
        assert!(queue.dequeue("default").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn peek_does_not_remove() {
        let queue = InMemoryJobQueue::new();
        let low = job("default", Priority::Low);
        let high = job("default", Priority::High);
        queue.enqueue(low).await.unwrap();
        queue.enqueue(high.clone()).await.unwrap();

        assert_eq!(queue.peek("default").await.unwrap().unwrap().id, high.id);
        assert_eq!(queue.size("default").await.unwrap(), 2);
        assert!(queue.peek("missing").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dequeue_hands_out_each_job_once() {
        const N: usize = 64;
        let queue = Arc::new(InMemoryJobQueue::new());
        let mut expected = HashSet::new();
        for _ in 0..N {
            let j = job("default", Priority::Normal);
            expected.insert(j.id);
            queue.enqueue(j).await.unwrap();
        }

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.dequeue("default").await.unwrap() })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            let job = h.await.unwrap().expect("every caller gets a job");
            assert!(seen.insert(job.id), "job handed out twice");
        }
        assert_eq!(seen, expected);
        assert_eq!(queue.size("default").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(job("mail", Priority::Low)).await.unwrap();
        queue.enqueue(job("reports", Priority::Critical)).await.unwrap();

        assert_eq!(queue.dequeue("mail").await.unwrap().unwrap().queue, "mail");
        assert_eq!(queue.queue_names().await.unwrap(), vec!["mail", "reports"]);
        assert_eq!(queue.size("reports").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let queue = InMemoryJobQueue::new();
        let ready = job("default", Priority::Normal);
        let scheduled = job_at(t0() + TimeDelta::hours(1));
        queue.enqueue(ready.clone()).await.unwrap();
        queue.schedule(scheduled.clone()).await.unwrap();

        assert!(queue.delete(ready.id).await.unwrap());
        assert!(queue.delete(scheduled.id).await.unwrap());
        assert!(!queue.delete(ready.id).await.unwrap());
        assert!(!queue.delete(JobId::from_ulid(Ulid::new())).await.unwrap());

        assert_eq!(queue.size("default").await.unwrap(), 0);
        assert_eq!(queue.scheduled_size().await.unwrap(), 0);
        assert!(queue.take_due(t0() + TimeDelta::days(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_jobs_promote_only_when_due() {
        let queue = InMemoryJobQueue::new();
        let later = job_at(t0() + TimeDelta::hours(1));
        queue.schedule(later.clone()).await.unwrap();
        assert_eq!(queue.size("default").await.unwrap(), 0);

        assert_eq!(queue.promote_due_jobs(t0()).await.unwrap(), 0);
        assert_eq!(queue.size("default").await.unwrap(), 0);

        let moved = queue
            .promote_due_jobs(t0() + TimeDelta::hours(1) + TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(moved, 1);
        assert_eq!(queue.size("default").await.unwrap(), 1);
        assert_eq!(queue.scheduled_size().await.unwrap(), 0);
        assert_eq!(queue.dequeue("default").await.unwrap().unwrap().id, later.id);
    }

    #[tokio::test]
    async fn take_due_returns_earliest_first() {
        let queue = InMemoryJobQueue::new();
        let second = job_at(t0() + TimeDelta::seconds(2));
        let first = job_at(t0() + TimeDelta::seconds(1));
        queue.schedule(second.clone()).await.unwrap();
        queue.schedule(first.clone()).await.unwrap();

        let due = queue.take_due(t0() + TimeDelta::seconds(5)).await.unwrap();
        let ids: Vec<_> = due.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn a_job_lives_in_one_structure_at_a_time() {
        let queue = InMemoryJobQueue::new();
        let mut j = job("default", Priority::Normal);
        queue.enqueue(j.clone()).await.unwrap();

        j.execute_at = t0() + TimeDelta::minutes(5);
        queue.schedule(j.clone()).await.unwrap();
        assert_eq!(queue.size("default").await.unwrap(), 0);
        assert_eq!(queue.scheduled_size().await.unwrap(), 1);

        queue.enqueue(j.clone()).await.unwrap();
        assert_eq!(queue.size("default").await.unwrap(), 1);
        assert_eq!(queue.scheduled_size().await.unwrap(), 0);
        // the stale heap entry must not resurface
        assert!(queue.take_due(t0() + TimeDelta::hours(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_rejects_blank_fields() {
        let queue = InMemoryJobQueue::new();
        let mut j = job("default", Priority::Normal);
        j.job_type = String::new();
        assert!(matches!(queue.enqueue(j).await, Err(EngineError::Validation(_))));
    }
}
