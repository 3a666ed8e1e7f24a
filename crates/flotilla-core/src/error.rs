// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Flotilla operations
#[derive(Error, Debug, Diagnostic)]
pub enum FlotillaError {
    /// Invalid queue definition
    #[error("Invalid queue {queue}: {reason}")]
    #[diagnostic(
        code(flotilla::invalid_queue),
        help("Queue names must be DNS-1123 subdomains and priority factors must be positive")
    )]
    InvalidQueue {
        #[allow(unused)]
        queue: String,
        #[allow(unused)]
        reason: String,
    },

    /// Invalid resource quantity
    #[error("Invalid resource quantity {value:?} for {resource}: {reason}")]
    #[diagnostic(
        code(flotilla::invalid_quantity),
        help("Quantities follow Kubernetes conventions, e.g. '100m', '2', '1Gi'")
    )]
    InvalidQuantity {
        #[allow(unused)]
        resource: String,
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// Invalid job definition
    #[error("Invalid job {job_id}: {reason}")]
    #[diagnostic(
        code(flotilla::invalid_job),
        help("Jobs must name an existing queue and carry a pod spec")
    )]
    InvalidJob {
        #[allow(unused)]
        job_id: String,
        #[allow(unused)]
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(flotilla::serialization_error),
        help("Ensure the resource format is valid JSON")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(flotilla::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for Flotilla core operations
pub type Result<T> = std::result::Result<T, FlotillaError>;

impl FlotillaError {
    /// Create an InvalidQueue error
    pub fn invalid_queue(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQueue {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidQuantity error
    pub fn invalid_quantity(
        resource: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidQuantity {
            resource: resource.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidJob error
    pub fn invalid_job(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
