//! In-process [`JobQueue`].

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::job::{DEFAULT_LEASE, DEFAULT_MAX_ATTEMPTS};
use crate::{Job, JobQueue, JobStatus, NewJob, QueueError};

/// Dead-lettered jobs kept for inspection; older ones are dropped.
pub const DEAD_LETTER_CAPACITY: usize = 256;

#[derive(Default)]
struct State {
    pending: VecDeque<Uuid>,
    /// Pending and processing jobs. Completed jobs are dropped.
    jobs: HashMap<Uuid, Job>,
    /// Lease expiry of every processing job.
    leases: HashMap<Uuid, Instant>,
    dead_letters: VecDeque<Job>,
}

impl State {
    /// Requeue `job_id`, or dead-letter it once its attempts are spent.
    fn release(&mut self, job_id: Uuid) -> Result<(), QueueError> {
        self.leases.remove(&job_id);
        let job = self.jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
        if job.attempts < job.max_attempts {
            job.status = JobStatus::Pending;
            self.pending.push_back(job_id);
            return Ok(());
        }

        if let Some(mut job) = self.jobs.remove(&job_id) {
            job.status = JobStatus::DeadLettered;
            warn!(%job_id, execution_id = %job.execution_id, attempts = job.attempts, "job dead-lettered");
            if self.dead_letters.len() == DEAD_LETTER_CAPACITY {
                self.dead_letters.pop_front();
            }
            self.dead_letters.push_back(job);
        }
        Ok(())
    }

    /// Release every processing job whose lease ran out before `now`.
    fn reclaim_expired(&mut self, now: Instant) -> Result<(), QueueError> {
        let mut expired: Vec<&Job> = self
            .leases
            .iter()
            .filter(|(_, expires)| **expires <= now)
            .filter_map(|(id, _)| self.jobs.get(id))
            .collect();
        expired.sort_by_key(|job| job.created_at);
        let expired: Vec<Uuid> = expired.into_iter().map(|job| job.id).collect();

        for job_id in expired {
            warn!(%job_id, "job lease expired, reclaiming");
            self.release(job_id)?;
        }
        Ok(())
    }
}

/// FIFO queue held in memory; lost on restart.
pub struct MemoryQueue {
    lease: Duration,
    state: Mutex<State>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::with_lease(DEFAULT_LEASE)
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(lease: Duration) -> Self {
        Self {
            lease,
            state: Mutex::new(State::default()),
        }
    }

    /// Number of jobs waiting to be claimed.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Jobs still held in memory: pending, processing or dead-lettered.
    pub async fn held_len(&self) -> usize {
        let state = self.state.lock().await;
        state.jobs.len() + state.dead_letters.len()
    }

    /// A live or dead-lettered job. Completed jobs are forgotten.
    pub async fn job(&self, job_id: Uuid) -> Option<Job> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(&job_id)
            .or_else(|| state.dead_letters.iter().find(|job| job.id == job_id))
            .cloned()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, new_job: NewJob) -> Result<Job, QueueError> {
        let job = Job {
            id: Uuid::new_v4(),
            execution_id: new_job.execution_id,
            workflow_id: new_job.workflow_id,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            payload: new_job.payload,
            created_at: Utc::now(),
        };
        let mut state = self.state.lock().await;
        state.pending.push_back(job.id);
        state.jobs.insert(job.id, job.clone());
        debug!(job_id = %job.id, execution_id = %job.execution_id, "job enqueued");
        Ok(job)
    }

    async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.reclaim_expired(now)?;

        let Some(job_id) = state.pending.pop_front() else {
            return Ok(None);
        };
        let job = state.jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
        job.status = JobStatus::Processing;
        job.attempts += 1;
        let job = job.clone();
        state.leases.insert(job_id, now + self.lease);
        Ok(Some(job))
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let expires = state.leases.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
        *expires = Instant::now() + self.lease;
        Ok(())
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.leases.remove(&job_id);
        if state.jobs.remove(&job_id).is_none() {
            // A reclaimed job may be settled by both its workers.
            debug!(%job_id, "job already settled");
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if !state.leases.contains_key(&job_id) {
            debug!(%job_id, "job is not claimed, nothing to release");
            return Ok(());
        }
        state.release(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_job() -> NewJob {
        NewJob {
            execution_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn jobs_come_out_in_fifo_order() {
        let queue = MemoryQueue::new();
        let first = queue.enqueue(new_job()).await.unwrap();
        let second = queue.enqueue(new_job()).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, first.id);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, second.id);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_jobs_are_requeued_until_dead_lettered() {
        let queue = MemoryQueue::new();
        let job = queue.enqueue(new_job()).await.unwrap();

        for attempt in 1..=DEFAULT_MAX_ATTEMPTS {
            let claimed = queue.dequeue().await.unwrap().expect("job available");
            assert_eq!(claimed.attempts, attempt);
            queue.fail(job.id).await.unwrap();
        }

        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.job(job.id).await.unwrap().status, JobStatus::DeadLettered);
    }

    #[tokio::test]
    async fn completed_jobs_are_dropped() {
        let queue = MemoryQueue::new();
        for _ in 0..10 {
            let job = queue.enqueue(new_job()).await.unwrap();
            queue.dequeue().await.unwrap();
            queue.complete(job.id).await.unwrap();
            assert!(queue.job(job.id).await.is_none());
        }
        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(queue.held_len().await, 0);
    }

    #[tokio::test]
    async fn dead_letters_are_bounded() {
        let queue = MemoryQueue::new();
        for _ in 0..DEAD_LETTER_CAPACITY + 5 {
            let job = queue.enqueue(new_job()).await.unwrap();
            for _ in 0..DEFAULT_MAX_ATTEMPTS {
                queue.dequeue().await.unwrap();
                queue.fail(job.id).await.unwrap();
            }
        }
        assert_eq!(queue.held_len().await, DEAD_LETTER_CAPACITY);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_hands_the_job_to_the_next_worker() {
        let queue = MemoryQueue::with_lease(Duration::from_secs(30));
        let job = queue.enqueue(new_job()).await.unwrap();
        queue.dequeue().await.unwrap().expect("first claim");

        // The first worker vanishes without completing or failing.
        assert!(queue.dequeue().await.unwrap().is_none());
        tokio::time::advance(Duration::from_secs(31)).await;

        let reclaimed = queue.dequeue().await.unwrap().expect("reclaimed");
        assert_eq!(reclaimed.id, job.id);
        assert_eq!(reclaimed.attempts, 2);
        assert_eq!(reclaimed.status, JobStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_keep_a_live_job_claimed() {
        let queue = MemoryQueue::with_lease(Duration::from_secs(30));
        let job = queue.enqueue(new_job()).await.unwrap();
        queue.dequeue().await.unwrap();

        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(20)).await;
            queue.heartbeat(job.id).await.unwrap();
            assert!(queue.dequeue().await.unwrap().is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_job_without_attempts_left_is_dead_lettered() {
        let queue = MemoryQueue::with_lease(Duration::from_secs(30));
        let job = queue.enqueue(new_job()).await.unwrap();

        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            queue.dequeue().await.unwrap().expect("claimed");
            tokio::time::advance(Duration::from_secs(31)).await;
        }

        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.job(job.id).await.unwrap().status, JobStatus::DeadLettered);
    }

    #[tokio::test]
    async fn heartbeat_for_an_unclaimed_job_is_an_error() {
        let queue = MemoryQueue::new();
        let job = queue.enqueue(new_job()).await.unwrap();
        assert!(matches!(
            queue.heartbeat(job.id).await,
            Err(QueueError::NotFound(id)) if id == job.id
        ));
    }
}
