use crate::error::{Result, SchedulerError};
use crate::repository::{JobRepository, UsageSnapshot};
use async_trait::async_trait;
use flotilla_core::{ComputeResources, Job, Queue};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory repository state for MockRepository
#[derive(Debug, Default)]
struct MockState {
    queues: Vec<Queue>,
    /// Pending (unleased) jobs per queue, in deterministic queue order
    pending: BTreeMap<String, Vec<Job>>,
    /// Job id -> holding cluster
    leased: BTreeMap<String, String>,
    usage: BTreeMap<String, ComputeResources>,
    allocation: BTreeMap<String, ComputeResources>,
    capacity: ComputeResources,
    peek_failures: usize,
    lease_failures: usize,
    call_delay: Option<Duration>,
}

/// Mock repository for testing the lease engine.
///
/// Serves peeks in deterministic order (job priority, then insertion) and
/// simulates atomic lease claims: once a job is leased to one cluster it is
/// removed from the pending set, so a concurrent caller cannot receive it.
/// Transient failures and per-call latency can be injected.
#[derive(Default)]
pub struct MockRepository {
    state: RwLock<MockState>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_queue(&self, queue: Queue) {
        self.state.write().await.queues.push(queue);
    }

    /// Add a pending job, keeping the owning queue's deterministic order
    pub async fn add_job(&self, job: Job) {
        let mut state = self.state.write().await;
        let pending = state.pending.entry(job.queue.clone()).or_default();
        pending.push(job);
        pending.sort_by(|a, b| a.priority.total_cmp(&b.priority));
    }

    pub async fn set_usage(&self, queue: impl Into<String>, usage: ComputeResources) {
        self.state.write().await.usage.insert(queue.into(), usage);
    }

    pub async fn set_allocation(&self, queue: impl Into<String>, allocation: ComputeResources) {
        self.state
            .write()
            .await
            .allocation
            .insert(queue.into(), allocation);
    }

    pub async fn set_capacity(&self, capacity: ComputeResources) {
        self.state.write().await.capacity = capacity;
    }

    /// Delay every repository call by `delay` (for deadline tests)
    pub async fn set_call_delay(&self, delay: Duration) {
        self.state.write().await.call_delay = Some(delay);
    }

    /// Fail the next `count` peeks with a transient error
    pub async fn inject_peek_failures(&self, count: usize) {
        self.state.write().await.peek_failures = count;
    }

    /// Fail the next `count` lease attempts with a transient error
    pub async fn inject_lease_failures(&self, count: usize) {
        self.state.write().await.lease_failures = count;
    }

    /// Ids of all jobs currently leased to `cluster_id`
    pub async fn leased_to(&self, cluster_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .leased
            .iter()
            .filter(|(_, cluster)| cluster.as_str() == cluster_id)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub async fn pending_count(&self, queue: &str) -> usize {
        self.state
            .read()
            .await
            .pending
            .get(queue)
            .map_or(0, Vec::len)
    }

    async fn simulate_latency(&self) {
        let delay = self.state.read().await.call_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl JobRepository for MockRepository {
    async fn peek_queue(&self, queue: &str, limit: usize) -> Result<Vec<Job>> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        if state.peek_failures > 0 {
            state.peek_failures -= 1;
            return Err(SchedulerError::repository(
                "peek",
                queue,
                "injected transient failure",
            ));
        }

        let jobs: Vec<Job> = state
            .pending
            .get(queue)
            .map(|pending| pending.iter().take(limit).cloned().collect())
            .unwrap_or_default();
        debug!("Mock: peeked queue {}: {} jobs", queue, jobs.len());
        Ok(jobs)
    }

    async fn try_lease_jobs(
        &self,
        cluster_id: &str,
        queue: &str,
        jobs: &[Job],
    ) -> Result<Vec<Job>> {
        self.simulate_latency().await;

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if state.lease_failures > 0 {
            state.lease_failures -= 1;
            return Err(SchedulerError::repository(
                "try_lease",
                queue,
                "injected transient failure",
            ));
        }

        let mut leased = Vec::new();
        for job in jobs {
            let Some(pending) = state.pending.get_mut(queue) else {
                continue;
            };
            // Only jobs still pending can be claimed
            if let Some(index) = pending.iter().position(|p| p.id == job.id) {
                let claimed = pending.remove(index);
                state.leased.insert(claimed.id.clone(), cluster_id.to_string());
                leased.push(claimed);
            }
        }
        debug!(
            "Mock: leased {} of {} jobs from {} to {}",
            leased.len(),
            jobs.len(),
            queue,
            cluster_id
        );
        Ok(leased)
    }
}

#[async_trait]
impl UsageSnapshot for MockRepository {
    async fn active_queues(&self) -> Result<Vec<Queue>> {
        Ok(self.state.read().await.queues.clone())
    }

    async fn queue_usage(&self) -> Result<BTreeMap<String, ComputeResources>> {
        Ok(self.state.read().await.usage.clone())
    }

    async fn queue_allocation(&self) -> Result<BTreeMap<String, ComputeResources>> {
        Ok(self.state.read().await.allocation.clone())
    }

    async fn total_capacity(&self) -> Result<ComputeResources> {
        Ok(self.state.read().await.capacity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_core::PodSpec;

    fn test_job(queue: &str, priority: f64) -> Job {
        Job::new(
            queue,
            priority,
            PodSpec {
                containers: vec![Default::default()],
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_peek_is_idempotent_and_ordered() {
        let repo = MockRepository::new();
        repo.add_job(test_job("analytics", 2.0)).await;
        repo.add_job(test_job("analytics", 1.0)).await;

        let first = repo.peek_queue("analytics", 10).await.unwrap();
        let second = repo.peek_queue("analytics", 10).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(first[0].priority <= first[1].priority);
        assert_eq!(
            first.iter().map(|j| &j.id).collect::<Vec<_>>(),
            second.iter().map(|j| &j.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_lease_is_atomic_across_clusters() {
        let repo = MockRepository::new();
        let job = test_job("analytics", 1.0);
        repo.add_job(job.clone()).await;

        let jobs = [job];
        let first = repo.try_lease_jobs("cluster-1", "analytics", &jobs).await.unwrap();
        let second = repo.try_lease_jobs("cluster-2", "analytics", &jobs).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(repo.leased_to("cluster-1").await.len(), 1);
        assert!(repo.leased_to("cluster-2").await.is_empty());
    }

    #[tokio::test]
    async fn test_leased_jobs_disappear_from_peek() {
        let repo = MockRepository::new();
        let job = test_job("analytics", 1.0);
        repo.add_job(job.clone()).await;

        repo.try_lease_jobs("cluster-1", "analytics", &[job]).await.unwrap();
        assert!(repo.peek_queue("analytics", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_peek_failures_are_transient() {
        let repo = MockRepository::new();
        repo.add_job(test_job("analytics", 1.0)).await;
        repo.inject_peek_failures(2).await;

        assert!(repo.peek_queue("analytics", 10).await.is_err());
        assert!(repo.peek_queue("analytics", 10).await.is_err());
        assert_eq!(repo.peek_queue("analytics", 10).await.unwrap().len(), 1);
    }
}
