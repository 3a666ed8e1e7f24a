//! Flotilla Core - Fundamental types for the Flotilla batch scheduler
//!
//! This crate provides:
//! - Queue and job model shared by the leasing engine and its collaborators
//! - Resource arithmetic over Kubernetes-style quantities
//! - Error types with miette diagnostics

pub mod error;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{FlotillaError, Result};
pub use resources::{ComputeResources, ComputeResourcesFloat, Quantity, QuantityError};
pub use types::{is_valid_name, Job, Queue};

// Re-export k8s-openapi pod types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Container, PodSpec};

/// Serialize a job or queue to JSON for the wire
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        FlotillaError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a job or queue from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        FlotillaError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let job = Job::new(
            "analytics",
            1.0,
            PodSpec {
                containers: vec![Default::default()],
                ..Default::default()
            },
        );

        let json = to_json(&job).unwrap();
        assert!(json.contains("analytics"));

        let deserialized: Job = from_json(&json).unwrap();
        assert_eq!(deserialized.id, job.id);
        assert_eq!(deserialized.queue, "analytics");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(from_json::<Job>("{not json").is_err());
    }
}
