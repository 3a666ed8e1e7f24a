use crate::error::Result;
use flotilla_core::{ComputeResources, FlotillaError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the lease engine.
///
/// Per-queue resource maps treat a missing resource entry as unlimited for
/// that resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum jobs requested from a queue per peek and offered per lease
    pub queue_lease_batch_size: usize,
    /// Absolute cap on what any one queue may be granted per lease call
    pub scheduling_limit_per_queue: ComputeResources,
    /// Steady-state cap on total resources held per queue
    pub resource_limit_per_queue: ComputeResources,
    /// Jobs smaller than this are not offered to the calling cluster
    pub minimum_job_size: ComputeResources,
    /// The engine stops initiating work this long before the call deadline
    pub lease_deadline_safety_margin: Duration,
    /// Hard cap on draining passes within one lease call
    pub max_lease_passes: usize,
    /// Retries per repository operation before a queue is skipped
    pub repository_retry_limit: usize,
    /// Resource against which scarcity weights are normalized
    pub scarcity_baseline_resource: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_lease_batch_size: 256,
            scheduling_limit_per_queue: ComputeResources::new(),
            resource_limit_per_queue: ComputeResources::new(),
            minimum_job_size: ComputeResources::new(),
            lease_deadline_safety_margin: Duration::from_secs(1),
            max_lease_passes: 100,
            repository_retry_limit: 3,
            scarcity_baseline_resource: "cpu".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Load a configuration from YAML
    pub fn from_yaml(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).map_err(|e| {
            FlotillaError::serialization_error(
                format!("Failed to deserialize scheduler config: {}", e),
                Some(Box::new(e)),
            )
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_core::Quantity;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.queue_lease_batch_size, 256);
        assert_eq!(config.lease_deadline_safety_margin, Duration::from_secs(1));
        assert_eq!(config.repository_retry_limit, 3);
        assert!(config.scheduling_limit_per_queue.is_empty());
        assert_eq!(config.scarcity_baseline_resource, "cpu");
    }

    #[test]
    fn test_from_yaml() {
        let config = SchedulerConfig::from_yaml(
            r#"
queue_lease_batch_size: 32
scheduling_limit_per_queue:
  cpu: "300"
scarcity_baseline_resource: cpu
"#,
        )
        .unwrap();

        assert_eq!(config.queue_lease_batch_size, 32);
        assert_eq!(
            config.scheduling_limit_per_queue.get("cpu"),
            Quantity::parse("300").unwrap()
        );
        // Unspecified fields fall back to defaults
        assert_eq!(config.max_lease_passes, 100);
    }

    #[test]
    fn test_from_yaml_rejects_garbage() {
        assert!(SchedulerConfig::from_yaml("queue_lease_batch_size: [nope]").is_err());
    }
}
