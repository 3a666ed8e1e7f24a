// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// Lease request rejected before scheduling began
    #[error("Invalid lease request from {cluster_id}: {reason}")]
    #[diagnostic(
        code(scheduler::invalid_request),
        help("Check the cluster id, label sets, and resource quantities in the request")
    )]
    InvalidRequest {
        cluster_id: String,
        reason: String,
    },

    /// Transient repository failure
    #[error("Repository error during {operation} on queue {queue}: {message}")]
    #[diagnostic(
        code(scheduler::repository_error),
        help("The operation is retried a bounded number of times; check repository connectivity")
    )]
    Repository {
        operation: String,
        queue: String,
        message: String,
    },

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(
        code(scheduler::core_error),
        help("This is an internal error")
    )]
    CoreError(#[from] flotilla_core::FlotillaError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError {
        message: String,
    },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create an InvalidRequest error
    pub fn invalid_request(cluster_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            cluster_id: cluster_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a Repository error
    pub fn repository(
        operation: impl Into<String>,
        queue: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Repository {
            operation: operation.into(),
            queue: queue.into(),
            message: message.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
