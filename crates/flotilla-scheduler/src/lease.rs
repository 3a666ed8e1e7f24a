use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::limits::remaining_scheduling_limits;
use crate::priority::{queue_priorities, scarcity_weights};
use crate::repository::{JobRepository, UsageSnapshot};
use crate::types::{LeaseRequest, LeaseResponse, QueueSchedulingInfo, TerminationReason};
use flotilla_core::resources::FLOAT_TOLERANCE;
use flotilla_core::{ComputeResourcesFloat, Job};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The fair-share lease engine.
///
/// One call to [`LeaseEngine::lease_jobs`] serves one inbound lease RPC:
/// it slices the caller's spare capacity across queues in inverse
/// proportion to their effective priority, drains queues iteratively
/// against that slice, and redistributes unused share to queues that still
/// have demand, stopping before the call deadline.
pub struct LeaseEngine {
    repository: Arc<dyn JobRepository>,
    usage: Arc<dyn UsageSnapshot>,
    config: SchedulerConfig,
}

impl LeaseEngine {
    /// Create a new lease engine
    pub fn new(
        repository: Arc<dyn JobRepository>,
        usage: Arc<dyn UsageSnapshot>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repository,
            usage,
            config,
        }
    }

    /// Run a single lease call for `request`.
    ///
    /// Returns the jobs granted to the calling cluster, in the order the
    /// repository granted them. Deadline expiry and cancellation yield a
    /// successful partial response; nothing already leased is rolled back.
    pub async fn lease_jobs(
        &self,
        request: LeaseRequest,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> Result<LeaseResponse> {
        request.validate()?;

        info!(
            "Lease call from {}: available [{}]",
            request.cluster_id, request.available_resources
        );

        let mut queues = Vec::new();
        for queue in self.usage.active_queues().await? {
            match queue.validate() {
                Ok(()) => queues.push(queue),
                Err(e) => warn!("Skipping invalid queue: {}", e),
            }
        }

        let usage = self.usage.queue_usage().await?;
        let allocation = self.usage.queue_allocation().await?;
        let capacity = self.usage.total_capacity().await?.to_float();

        let scarcity = scarcity_weights(&capacity, &self.config.scarcity_baseline_resource);
        let priorities = queue_priorities(&queues, &usage, &capacity, &scarcity);

        let available = request.available_resources.to_float();
        let limits =
            remaining_scheduling_limits(&queues, &allocation, &capacity, &available, &self.config);

        let mut states: Vec<QueueState> = queues
            .iter()
            .filter_map(|queue| {
                let limit = limits.get(&queue.name)?;
                Some(QueueState::new(
                    queue.name.clone(),
                    priorities[&queue.name].priority,
                    limit.clone(),
                ))
            })
            .collect();

        if states.is_empty() {
            info!("Lease call from {}: no eligible queues", request.cluster_id);
            return Ok(LeaseResponse {
                jobs: Vec::new(),
                termination: TerminationReason::Exhausted,
            });
        }

        // Phase 1: proportional slicing, capped by per-queue limits
        let weight_sum: f64 = states.iter().map(|s| 1.0 / s.priority).sum();
        for state in &mut states {
            let share = available
                .mul((1.0 / state.priority) / weight_sum)
                .min(&state.info.remaining_scheduling_limit);
            debug!("Queue {} scheduling share [{}]", state.name, share);
            state.info.scheduling_share = share.clone();
            state.info.adjusted_share = share;
        }

        // Ties broken by name for a stable visit order
        states.sort_by(|a, b| a.priority.total_cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

        let call = LeaseCall {
            repository: Arc::clone(&self.repository),
            config: self.config.clone(),
            advertised: available.clone(),
            available,
            request,
            deadline,
            cancel,
            queues: states,
            leased: Vec::new(),
            passes: 0,
        };

        Ok(call.run().await)
    }
}

/// Per-queue state scoped to one lease call
struct QueueState {
    name: String,
    /// Effective priority; lower is visited first
    priority: f64,
    info: QueueSchedulingInfo,
    /// Candidates peeked but not yet leased or discarded
    cache: VecDeque<Job>,
    /// Ids already ingested into the cache this call
    seen: HashSet<String>,
    /// The repository has no further new candidates this call
    drained: bool,
    /// Saturated or failed: skipped for the remainder of the call
    skipped: bool,
}

impl QueueState {
    fn new(name: String, priority: f64, limit: ComputeResourcesFloat) -> Self {
        Self {
            name,
            priority,
            info: QueueSchedulingInfo {
                remaining_scheduling_limit: limit,
                scheduling_share: ComputeResourcesFloat::new(),
                adjusted_share: ComputeResourcesFloat::new(),
            },
            cache: VecDeque::new(),
            seen: HashSet::new(),
            drained: false,
            skipped: false,
        }
    }

    /// Still a candidate for redistributed share
    fn demanding(&self) -> bool {
        !self.skipped
            && !self.info.remaining_scheduling_limit.is_zero()
            && (!self.cache.is_empty() || !self.drained)
    }
}

/// All mutable state of one in-flight lease call. Never outlives the call.
struct LeaseCall {
    repository: Arc<dyn JobRepository>,
    config: SchedulerConfig,
    request: LeaseRequest,
    deadline: Instant,
    cancel: CancellationToken,
    /// Capacity the cluster advertised at call start
    advertised: ComputeResourcesFloat,
    /// Capacity remaining for this call
    available: ComputeResourcesFloat,
    queues: Vec<QueueState>,
    leased: Vec<Job>,
    passes: usize,
}

impl LeaseCall {
    async fn run(mut self) -> LeaseResponse {
        let termination = loop {
            if self.cancel.is_cancelled() {
                break TerminationReason::Cancelled;
            }
            if self.deadline_reached() {
                break TerminationReason::DeadlineExceeded;
            }
            if self.minimum_no_longer_fits() {
                break TerminationReason::Exhausted;
            }
            if self.passes >= self.config.max_lease_passes {
                break TerminationReason::PassLimit;
            }

            self.passes += 1;
            let (progress, interrupted) = self.run_pass().await;
            if let Some(reason) = interrupted {
                break reason;
            }

            let shares_changed = self.redistribute();
            if !progress && !shares_changed {
                break TerminationReason::NoProgress;
            }
        };

        info!(
            "Lease call from {} done after {} passes: {} jobs, {}",
            self.request.cluster_id,
            self.passes,
            self.leased.len(),
            termination
        );

        LeaseResponse {
            jobs: self.leased,
            termination,
        }
    }

    fn deadline_reached(&self) -> bool {
        Instant::now() + self.config.lease_deadline_safety_margin >= self.deadline
    }

    fn minimum_no_longer_fits(&self) -> bool {
        let minimum = self.request.minimum_job_size.to_float();
        !minimum.is_empty() && !minimum.fits(&self.available)
    }

    /// Visit every live queue once, in ascending priority order
    async fn run_pass(&mut self) -> (bool, Option<TerminationReason>) {
        let mut progress = false;

        for index in 0..self.queues.len() {
            if self.cancel.is_cancelled() {
                return (progress, Some(TerminationReason::Cancelled));
            }
            if self.deadline_reached() {
                return (progress, Some(TerminationReason::DeadlineExceeded));
            }
            if self.queues[index].skipped {
                continue;
            }

            progress |= self.visit_queue(index).await;
        }

        (progress, None)
    }

    /// Accumulate and lease one batch for the queue at `index`. Returns
    /// whether any job was granted.
    async fn visit_queue(&mut self, index: usize) -> bool {
        if !self.refill_cache(index).await {
            return false;
        }

        let queue = &mut self.queues[index];
        let mut batch: Vec<Job> = Vec::new();
        let mut batch_total = ComputeResourcesFloat::new();
        let mut blocked_on_share = false;
        let mut discarded: Vec<usize> = Vec::new();

        for (position, job) in queue.cache.iter().enumerate() {
            if batch.len() >= self.config.queue_lease_batch_size {
                break;
            }

            let request_total = job.total_resource_request();
            if !request_total.meets_minimum(&self.request.minimum_job_size) {
                debug!("Job {} below minimum job size, discarded", job.id);
                discarded.push(position);
                continue;
            }
            if !self.request.matches_labels(&job.required_node_labels) {
                debug!("Job {} labels not satisfied by cluster, discarded", job.id);
                discarded.push(position);
                continue;
            }

            let required = request_total.to_float();
            if !required.fits(&self.advertised) {
                debug!("Job {} exceeds advertised capacity, discarded", job.id);
                discarded.push(position);
                continue;
            }

            let mut with_batch = batch_total.clone();
            with_batch.add(&required);
            if with_batch.fits(&queue.info.adjusted_share) && with_batch.fits(&self.available) {
                batch.push(job.clone());
                batch_total = with_batch;
            } else if required.fits(&self.available) {
                // Fits the cluster but not the queue's current share;
                // redistribution may unblock it on a later pass
                blocked_on_share = true;
            }
        }

        for position in discarded.into_iter().rev() {
            queue.cache.remove(position);
        }

        if batch.is_empty() {
            if !blocked_on_share {
                // Zero fitting candidates at the head of the cache: the
                // queue is saturated for the rest of this call. Its share
                // is pooled at the next redistribution.
                debug!("Queue {} saturated", queue.name);
                queue.skipped = true;
            }
            return false;
        }

        let queue_name = queue.name.clone();
        match self.lease_with_retry(&queue_name, &batch).await {
            Ok(granted) => self.record_granted(index, &batch, granted),
            Err(e) => {
                warn!("Giving up on queue {} for this call: {}", queue_name, e);
                self.queues[index].skipped = true;
                false
            }
        }
    }

    /// Refill the queue's candidate cache when it is empty. Returns false
    /// when the queue has nothing further to offer this call.
    async fn refill_cache(&mut self, index: usize) -> bool {
        {
            let queue = &self.queues[index];
            if !queue.cache.is_empty() {
                return true;
            }
            if queue.drained {
                // Permanently out of candidates
                self.queues[index].skipped = true;
                return false;
            }
        }

        let queue_name = self.queues[index].name.clone();
        match self.peek_with_retry(&queue_name).await {
            Ok(jobs) => {
                let queue = &mut self.queues[index];
                let before = queue.cache.len();
                for job in jobs {
                    if queue.seen.insert(job.id.clone()) {
                        queue.cache.push_back(job);
                    }
                }
                if queue.cache.len() == before {
                    queue.drained = true;
                    queue.skipped = true;
                    return false;
                }
                true
            }
            Err(e) => {
                warn!("Giving up on queue {} for this call: {}", queue_name, e);
                self.queues[index].skipped = true;
                false
            }
        }
    }

    /// Account for the subset the repository actually granted
    fn record_granted(&mut self, index: usize, offered: &[Job], granted: Vec<Job>) -> bool {
        let queue = &mut self.queues[index];

        // Offered jobs leave the cache either way: granted ones are ours,
        // the rest were claimed by another cluster in the meantime
        let offered_ids: HashSet<&str> = offered.iter().map(|job| job.id.as_str()).collect();
        queue.cache.retain(|job| !offered_ids.contains(job.id.as_str()));

        if granted.len() < offered.len() {
            debug!(
                "Queue {}: {} of {} offered jobs already claimed elsewhere",
                queue.name,
                offered.len() - granted.len(),
                offered.len()
            );
        }

        for job in &granted {
            let required = job.total_resource_request().to_float();
            self.available.sub(&required);
            queue.info.adjusted_share.sub(&required);
            queue.info.remaining_scheduling_limit.sub(&required);
        }

        let progress = !granted.is_empty();
        self.leased.extend(granted);
        progress
    }

    /// Pool every queue's unused share and re-split it across queues that
    /// still have demand, in inverse-priority proportion capped by their
    /// remaining limits. Returns whether any share moved.
    fn redistribute(&mut self) -> bool {
        let mut pool = ComputeResourcesFloat::new();
        let mut previous: Vec<ComputeResourcesFloat> = Vec::with_capacity(self.queues.len());
        for queue in &mut self.queues {
            previous.push(queue.info.adjusted_share.clone());
            pool.add(&queue.info.adjusted_share);
            queue.info.adjusted_share = ComputeResourcesFloat::new();
        }

        let recipients: Vec<usize> = (0..self.queues.len())
            .filter(|i| self.queues[*i].demanding())
            .collect();

        if !recipients.is_empty() && !pool.is_zero() {
            let weight_sum: f64 = recipients
                .iter()
                .map(|i| 1.0 / self.queues[*i].priority)
                .sum();
            for i in recipients {
                let queue = &mut self.queues[i];
                queue.info.adjusted_share = pool
                    .mul((1.0 / queue.priority) / weight_sum)
                    .min(&queue.info.remaining_scheduling_limit);
            }
        }

        self.queues.iter().zip(previous).any(|(queue, old)| {
            queue
                .info
                .adjusted_share
                .iter()
                .any(|(resource, amount)| (amount - old.get(resource)).abs() > FLOAT_TOLERANCE)
                || old
                    .iter()
                    .any(|(resource, amount)| {
                        (queue.info.adjusted_share.get(resource) - amount).abs() > FLOAT_TOLERANCE
                    })
        })
    }

    async fn peek_with_retry(&self, queue: &str) -> Result<Vec<Job>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .repository
                .peek_queue(queue, self.config.queue_lease_batch_size)
                .await
            {
                Ok(jobs) => return Ok(jobs),
                Err(e) if attempt < self.config.repository_retry_limit => {
                    warn!("Peek attempt {} for queue {} failed: {}", attempt, queue, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn lease_with_retry(&self, queue: &str, jobs: &[Job]) -> Result<Vec<Job>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .repository
                .try_lease_jobs(&self.request.cluster_id, queue, jobs)
                .await
            {
                Ok(granted) => return Ok(granted),
                Err(e) if attempt < self.config.repository_retry_limit => {
                    warn!("Lease attempt {} for queue {} failed: {}", attempt, queue, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
