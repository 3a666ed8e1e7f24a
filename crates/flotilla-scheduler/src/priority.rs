use crate::types::QueuePriorityInfo;
use flotilla_core::{ComputeResources, ComputeResourcesFloat, Queue};
use std::collections::BTreeMap;
use tracing::debug;

/// Floor on the dominant-resource share entering priority computation, so
/// a queue with zero historical usage is not advantaged infinitely.
pub const MIN_PRIORITY: f64 = 0.5;

/// Per-resource scarcity weights relative to a baseline resource.
///
/// Each resource present in the cluster-wide capacity is weighted by
/// `capacity[baseline] / capacity[resource]`, so the baseline gets 1.0 and
/// rarer resources (e.g. `gpu`) are proportionally larger. Resources with
/// zero capacity are skipped; without baseline capacity every weight
/// falls back to 1.0.
pub fn scarcity_weights(
    total_capacity: &ComputeResourcesFloat,
    baseline: &str,
) -> BTreeMap<String, f64> {
    let baseline_capacity = total_capacity.get(baseline);

    let mut weights = BTreeMap::new();
    for (resource, amount) in total_capacity.iter() {
        if *amount <= 0.0 {
            continue;
        }
        let weight = if baseline_capacity > 0.0 {
            baseline_capacity / amount
        } else {
            1.0
        };
        weights.insert(resource.clone(), weight);
    }
    weights
}

/// Derive each queue's effective priority from its configured factor and
/// historical usage. Lower is better. Deterministic for identical inputs.
pub fn queue_priorities(
    queues: &[Queue],
    usage: &BTreeMap<String, ComputeResources>,
    total_capacity: &ComputeResourcesFloat,
    scarcity: &BTreeMap<String, f64>,
) -> BTreeMap<String, QueuePriorityInfo> {
    let mut priorities = BTreeMap::new();

    for queue in queues {
        let current_usage = usage.get(&queue.name).cloned().unwrap_or_default();
        let share = current_usage
            .to_float()
            .dominant_resource_share(total_capacity, scarcity);
        let priority = queue.priority_factor * share.max(MIN_PRIORITY);

        debug!(
            "Queue {} priority {:.4} (factor {}, dominant share {:.4})",
            queue.name, priority, queue.priority_factor, share
        );

        priorities.insert(
            queue.name.clone(),
            QueuePriorityInfo {
                priority,
                current_usage,
            },
        );
    }

    priorities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::resources;

    #[test]
    fn test_scarcity_weights_elevate_rare_resources() {
        let capacity = resources(&[("cpu", "1000"), ("gpu", "10"), ("memory", "0")]).to_float();
        let weights = scarcity_weights(&capacity, "cpu");

        assert_eq!(weights.get("cpu"), Some(&1.0));
        assert_eq!(weights.get("gpu"), Some(&100.0));
        // Zero-capacity resources carry no weight
        assert!(!weights.contains_key("memory"));
    }

    #[test]
    fn test_scarcity_weights_without_baseline() {
        let capacity = resources(&[("gpu", "10")]).to_float();
        let weights = scarcity_weights(&capacity, "cpu");
        assert_eq!(weights.get("gpu"), Some(&1.0));
    }

    #[test]
    fn test_idle_queue_gets_floored_priority() {
        let queues = vec![Queue::new("idle", 2.0)];
        let capacity = resources(&[("cpu", "100")]).to_float();
        let scarcity = scarcity_weights(&capacity, "cpu");

        let priorities = queue_priorities(&queues, &BTreeMap::new(), &capacity, &scarcity);
        assert_eq!(priorities["idle"].priority, 2.0 * MIN_PRIORITY);
    }

    #[test]
    fn test_heavy_usage_worsens_priority() {
        let queues = vec![Queue::new("busy", 1.0), Queue::new("idle", 1.0)];
        let mut usage = BTreeMap::new();
        usage.insert("busy".to_string(), resources(&[("cpu", "90")]));

        let capacity = resources(&[("cpu", "100")]).to_float();
        let scarcity = scarcity_weights(&capacity, "cpu");
        let priorities = queue_priorities(&queues, &usage, &capacity, &scarcity);

        assert!(priorities["busy"].priority > priorities["idle"].priority);
    }

    #[test]
    fn test_priorities_are_deterministic() {
        let queues = vec![Queue::new("a", 1.5), Queue::new("b", 3.0)];
        let mut usage = BTreeMap::new();
        usage.insert("a".to_string(), resources(&[("cpu", "40"), ("gpu", "2")]));
        usage.insert("b".to_string(), resources(&[("cpu", "10")]));

        let capacity = resources(&[("cpu", "100"), ("gpu", "4")]).to_float();
        let scarcity = scarcity_weights(&capacity, "cpu");

        let first = queue_priorities(&queues, &usage, &capacity, &scarcity);
        let second = queue_priorities(&queues, &usage, &capacity, &scarcity);

        for name in ["a", "b"] {
            assert_eq!(first[name].priority, second[name].priority);
        }
    }
}
