use crate::error::Result;
use async_trait::async_trait;
use flotilla_core::{ComputeResources, Job, Queue};
use std::collections::BTreeMap;

/// The job repository contract the lease engine consumes.
///
/// The engine never touches storage directly; implementations own
/// persistence and the atomicity of lease claims. Two concurrent callers
/// of `try_lease_jobs` cannot both receive the same job.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Return up to `limit` unleased jobs from the head of `queue`, in
    /// deterministic queue order, without claiming them. Idempotent.
    async fn peek_queue(&self, queue: &str, limit: usize) -> Result<Vec<Job>>;

    /// Atomically claim the subset of `jobs` still unleased for
    /// `cluster_id` and return it. Jobs claimed by another cluster in the
    /// meantime are silently dropped from the result.
    async fn try_lease_jobs(&self, cluster_id: &str, queue: &str, jobs: &[Job])
        -> Result<Vec<Job>>;
}

/// Eventually-consistent usage and capacity reads consumed by the
/// priority and limit models.
#[async_trait]
pub trait UsageSnapshot: Send + Sync {
    /// Queues with pending work, with their priority factors and caps
    async fn active_queues(&self) -> Result<Vec<Queue>>;

    /// Historical per-queue usage driving priority weights
    async fn queue_usage(&self) -> Result<BTreeMap<String, ComputeResources>>;

    /// Resources each queue currently holds across all clusters
    async fn queue_allocation(&self) -> Result<BTreeMap<String, ComputeResources>>;

    /// Cluster-wide capacity aggregate
    async fn total_capacity(&self) -> Result<ComputeResources>;
}
