use crate::error::{Result, SchedulerError};
use flotilla_core::{is_valid_name, ComputeResources, ComputeResourcesFloat, Job, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A worker cluster's request for work, carrying its instantaneous
/// capacity report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRequest {
    /// Calling cluster
    pub cluster_id: String,
    /// Spare capacity the cluster can take on right now
    pub available_resources: ComputeResources,
    /// One label set per node-labeling group in the cluster
    #[serde(default)]
    pub available_labels: Vec<BTreeMap<String, String>>,
    /// Smallest job the cluster is willing to run
    #[serde(default)]
    pub minimum_job_size: ComputeResources,
}

impl LeaseRequest {
    /// Reject malformed requests before any scheduling work happens
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.cluster_id) {
            return Err(SchedulerError::invalid_request(
                &self.cluster_id,
                "cluster id must be a DNS-1123 subdomain",
            ));
        }

        for (resource, amount) in self
            .available_resources
            .iter()
            .chain(self.minimum_job_size.iter())
        {
            if amount.millis() < 0 {
                return Err(SchedulerError::invalid_request(
                    &self.cluster_id,
                    format!("negative capacity for {}: {}", resource, amount),
                ));
            }
        }

        for group in &self.available_labels {
            if group.keys().any(|key| key.is_empty()) {
                return Err(SchedulerError::invalid_request(
                    &self.cluster_id,
                    "label group contains an empty key",
                ));
            }
        }

        Ok(())
    }

    /// True iff every required label is satisfied by at least one single
    /// node-labeling group of this cluster
    pub fn matches_labels(&self, required: &BTreeMap<String, String>) -> bool {
        if required.is_empty() {
            return true;
        }
        self.available_labels.iter().any(|group| {
            required
                .iter()
                .all(|(key, value)| group.get(key) == Some(value))
        })
    }
}

/// Why a lease call stopped. Every reason is a successful (possibly
/// partial) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Remaining capacity cannot fit the cluster's minimum job size
    Exhausted,
    /// A full pass over all queues leased nothing
    NoProgress,
    /// The soft deadline (deadline minus safety margin) elapsed
    DeadlineExceeded,
    /// The caller cancelled the call
    Cancelled,
    /// The per-call pass cap was reached
    PassLimit,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationReason::Exhausted => "exhausted",
            TerminationReason::NoProgress => "no progress",
            TerminationReason::DeadlineExceeded => "deadline exceeded",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::PassLimit => "pass limit reached",
        };
        write!(f, "{}", s)
    }
}

/// The jobs leased by one call, in the order the repository granted them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub jobs: Vec<Job>,
    pub termination: TerminationReason,
}

impl LeaseResponse {
    /// Total resources granted by this response
    pub fn total_resources(&self) -> ComputeResources {
        let mut total = ComputeResources::new();
        for job in &self.jobs {
            total.add(&job.total_resource_request());
        }
        total
    }
}

/// Per-queue priority snapshot derived from historical usage
#[derive(Debug, Clone)]
pub struct QueuePriorityInfo {
    /// Effective priority; lower is better
    pub priority: f64,
    /// Resources the queue currently holds cluster-wide
    pub current_usage: ComputeResources,
}

/// Per-queue mutable state scoped to a single lease call
#[derive(Debug, Clone, Default)]
pub struct QueueSchedulingInfo {
    /// Ceiling on what this queue may still be granted in this call
    pub remaining_scheduling_limit: ComputeResourcesFloat,
    /// The queue's initial slice of the request
    pub scheduling_share: ComputeResourcesFloat,
    /// The slice as adjusted by leases and redistribution
    pub adjusted_share: ComputeResourcesFloat,
}

/// Convenience for building label maps in requests and jobs
pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Convenience for building resource maps from quantity strings.
/// Panics on unparsable quantities; intended for configuration and tests.
pub fn resources(pairs: &[(&str, &str)]) -> ComputeResources {
    pairs
        .iter()
        .map(|(k, v)| {
            (
                k.to_string(),
                Quantity::parse(v).unwrap_or_else(|e| panic!("bad quantity {}: {}", v, e)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_labels(groups: Vec<BTreeMap<String, String>>) -> LeaseRequest {
        LeaseRequest {
            cluster_id: "cluster-1".to_string(),
            available_resources: resources(&[("cpu", "10")]),
            available_labels: groups,
            minimum_job_size: ComputeResources::new(),
        }
    }

    #[test]
    fn test_label_match_requires_single_group() {
        let required = labels(&[("region", "eu"), ("zone", "1")]);

        // Labels split across groups do not satisfy the job
        let split = request_with_labels(vec![labels(&[("region", "eu")]), labels(&[("zone", "2")])]);
        assert!(!split.matches_labels(&required));

        // One group carrying all required labels does
        let combined = request_with_labels(vec![
            labels(&[("x", "y")]),
            labels(&[("region", "eu"), ("zone", "1"), ("x", "y")]),
        ]);
        assert!(combined.matches_labels(&required));
    }

    #[test]
    fn test_no_required_labels_always_matches() {
        let request = request_with_labels(vec![]);
        assert!(request.matches_labels(&BTreeMap::new()));
    }

    #[test]
    fn test_validate_rejects_bad_cluster_id() {
        let mut request = request_with_labels(vec![]);
        request.cluster_id = "Not Valid".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_capacity() {
        let mut request = request_with_labels(vec![]);
        request
            .available_resources
            .insert("cpu", Quantity::from_millis(-500));
        assert!(matches!(
            request.validate(),
            Err(SchedulerError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_label_key() {
        let request = request_with_labels(vec![labels(&[("", "x")])]);
        assert!(request.validate().is_err());
    }
}
