use crate::error::{FlotillaError, Result};
use crate::resources::{ComputeResources, Quantity};
use k8s_openapi::api::core::v1::PodSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named bucket of pending jobs owned by a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    /// Unique queue name (DNS-1123 subdomain)
    pub name: String,
    /// Positive priority factor; smaller means higher priority
    pub priority_factor: f64,
    /// Optional per-resource caps as fractions of cluster capacity, in [0, 1]
    #[serde(default)]
    pub resource_limits: BTreeMap<String, f64>,
}

impl Queue {
    /// Create a queue with no custom resource limits
    pub fn new(name: impl Into<String>, priority_factor: f64) -> Self {
        Self {
            name: name.into(),
            priority_factor,
            resource_limits: BTreeMap::new(),
        }
    }

    /// Validate the queue definition
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(FlotillaError::invalid_queue(
                &self.name,
                "name must be a DNS-1123 subdomain",
            ));
        }

        if !self.priority_factor.is_finite() || self.priority_factor <= 0.0 {
            return Err(FlotillaError::invalid_queue(
                &self.name,
                format!("priority factor must be positive, got {}", self.priority_factor),
            ));
        }

        for (resource, fraction) in &self.resource_limits {
            if !fraction.is_finite() || !(0.0..=1.0).contains(fraction) {
                return Err(FlotillaError::invalid_queue(
                    &self.name,
                    format!("resource limit for {} must be in [0, 1], got {}", resource, fraction),
                ));
            }
        }

        Ok(())
    }
}

/// A pending batch job. Opaque to scheduling except for its pod spec,
/// required node labels, and in-queue priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job id
    pub id: String,
    /// Owning queue
    pub queue: String,
    /// Ordering hint within the queue; smaller runs first
    pub priority: f64,
    /// Containerized workload to run
    pub pod_spec: PodSpec,
    /// Labels that must all be satisfied by a single node group of the
    /// leasing cluster
    #[serde(default)]
    pub required_node_labels: BTreeMap<String, String>,
}

impl Job {
    /// Create a job with a fresh id
    pub fn new(queue: impl Into<String>, priority: f64, pod_spec: PodSpec) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue: queue.into(),
            priority,
            pod_spec,
            required_node_labels: BTreeMap::new(),
        }
    }

    /// Validate the job definition
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(FlotillaError::invalid_job("<unset>", "job id is empty"));
        }
        if !is_valid_name(&self.queue) {
            return Err(FlotillaError::invalid_job(
                &self.id,
                format!("invalid queue name: {}", self.queue),
            ));
        }
        if self.pod_spec.containers.is_empty() {
            return Err(FlotillaError::invalid_job(
                &self.id,
                "pod spec must have at least one container",
            ));
        }
        Ok(())
    }

    /// Total resource request of the job: the per-resource sum across its
    /// containers, taking the max of request vs. limit per container.
    ///
    /// Quantities that fail to parse count as zero; job specs arrive from
    /// the repository and must not abort a lease call.
    pub fn total_resource_request(&self) -> ComputeResources {
        let empty = BTreeMap::new();
        let mut total = ComputeResources::new();

        for container in &self.pod_spec.containers {
            let Some(resources) = &container.resources else {
                continue;
            };
            let requests = resources.requests.as_ref().unwrap_or(&empty);
            let limits = resources.limits.as_ref().unwrap_or(&empty);

            let mut per_container = ComputeResources::new();
            for (resource, quantity) in requests {
                if let Ok(amount) = Quantity::parse(&quantity.0) {
                    per_container.insert(resource.clone(), amount);
                }
            }
            for (resource, quantity) in limits {
                if let Ok(amount) = Quantity::parse(&quantity.0) {
                    per_container.insert(resource.clone(), per_container.get(resource).max(amount));
                }
            }

            total.add(&per_container);
        }

        total
    }
}

/// Validate a queue or cluster name (DNS-1123 subdomain)
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    alnum(bytes[0])
        && alnum(bytes[bytes.len() - 1])
        && bytes.iter().all(|b| alnum(*b) || *b == b'-' || *b == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;

    fn quantity_map(pairs: &[(&str, &str)]) -> BTreeMap<String, K8sQuantity> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), K8sQuantity(v.to_string())))
            .collect()
    }

    fn container(requests: &[(&str, &str)], limits: &[(&str, &str)]) -> Container {
        Container {
            name: "main".to_string(),
            resources: Some(ResourceRequirements {
                requests: Some(quantity_map(requests)),
                limits: Some(quantity_map(limits)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod_spec(containers: Vec<Container>) -> PodSpec {
        PodSpec {
            containers,
            ..Default::default()
        }
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("analytics"));
        assert!(is_valid_name("gpu-team-1"));
        assert!(is_valid_name("team.batch"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name("GpuTeam"));
        assert!(!is_valid_name("-team"));
        assert!(!is_valid_name("team-"));
        assert!(!is_valid_name("gpu_team"));
    }

    #[test]
    fn test_queue_validation() {
        assert!(Queue::new("analytics", 1.0).validate().is_ok());
        assert!(Queue::new("Analytics", 1.0).validate().is_err());
        assert!(Queue::new("analytics", 0.0).validate().is_err());
        assert!(Queue::new("analytics", -1.0).validate().is_err());

        let mut queue = Queue::new("analytics", 1.0);
        queue.resource_limits.insert("cpu".to_string(), 1.5);
        assert!(queue.validate().is_err());
    }

    #[test]
    fn test_total_resource_request_sums_containers() {
        let job = Job::new(
            "analytics",
            1.0,
            pod_spec(vec![
                container(&[("cpu", "1"), ("memory", "1Gi")], &[]),
                container(&[("cpu", "500m")], &[]),
            ]),
        );

        let total = job.total_resource_request();
        assert_eq!(total.get("cpu"), Quantity::parse("1500m").unwrap());
        assert_eq!(total.get("memory"), Quantity::parse("1Gi").unwrap());
    }

    #[test]
    fn test_total_resource_request_takes_max_of_request_and_limit() {
        let job = Job::new(
            "analytics",
            1.0,
            pod_spec(vec![container(&[("cpu", "1")], &[("cpu", "2"), ("memory", "1Gi")])]),
        );

        let total = job.total_resource_request();
        assert_eq!(total.get("cpu"), Quantity::parse("2").unwrap());
        assert_eq!(total.get("memory"), Quantity::parse("1Gi").unwrap());
    }

    #[test]
    fn test_total_resource_request_skips_unparsable() {
        let job = Job::new(
            "analytics",
            1.0,
            pod_spec(vec![container(&[("cpu", "not-a-number")], &[])]),
        );

        assert!(job.total_resource_request().get("cpu").is_zero());
    }

    #[test]
    fn test_job_validation() {
        let job = Job::new("analytics", 1.0, pod_spec(vec![container(&[], &[])]));
        assert!(job.validate().is_ok());

        let no_containers = Job::new("analytics", 1.0, pod_spec(vec![]));
        assert!(no_containers.validate().is_err());

        let bad_queue = Job::new("Bad Queue", 1.0, pod_spec(vec![container(&[], &[])]));
        assert!(bad_queue.validate().is_err());
    }
}
