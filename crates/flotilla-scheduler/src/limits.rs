use crate::config::SchedulerConfig;
use flotilla_core::resources::FLOAT_TOLERANCE;
use flotilla_core::{ComputeResources, ComputeResourcesFloat, Queue};
use std::collections::BTreeMap;
use tracing::debug;

/// A per-queue cap; configuration entries missing a resource mean
/// unlimited for that resource.
fn cap_for(caps: &ComputeResources, resource: &str) -> f64 {
    if caps.contains(resource) {
        caps.get(resource).as_f64()
    } else {
        f64::INFINITY
    }
}

/// Compute each queue's `remaining_scheduling_limit` over the resources the
/// lease request offers.
///
/// Per queue and resource: the steady-state cap (global
/// `resource_limit_per_queue`, overridden by the queue's own capacity
/// fraction whether smaller or larger) minus the queue's current
/// allocation, floored at zero, then capped by the global per-call
/// `scheduling_limit_per_queue`. Queues with zero headroom in every
/// requested resource are dropped from the lease call.
pub fn remaining_scheduling_limits(
    queues: &[Queue],
    allocation: &BTreeMap<String, ComputeResources>,
    total_capacity: &ComputeResourcesFloat,
    requested: &ComputeResourcesFloat,
    config: &SchedulerConfig,
) -> BTreeMap<String, ComputeResourcesFloat> {
    let mut limits = BTreeMap::new();

    for queue in queues {
        let current = allocation.get(&queue.name).cloned().unwrap_or_default();
        let mut remaining = ComputeResourcesFloat::new();
        let mut has_headroom = false;

        for (resource, _) in requested.iter() {
            let mut cap = cap_for(&config.resource_limit_per_queue, resource);
            if let Some(fraction) = queue.resource_limits.get(resource) {
                cap = total_capacity.get(resource) * fraction;
            }

            let headroom = (cap - current.get(resource).as_f64()).max(0.0);
            let limit = headroom.min(cap_for(&config.scheduling_limit_per_queue, resource));

            if limit > FLOAT_TOLERANCE {
                has_headroom = true;
            }
            remaining.insert(resource.clone(), limit);
        }

        if has_headroom {
            limits.insert(queue.name.clone(), remaining);
        } else {
            debug!("Queue {} has no headroom, dropped from lease call", queue.name);
        }
    }

    limits
}
