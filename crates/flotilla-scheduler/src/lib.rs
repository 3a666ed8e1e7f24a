//! Flotilla Scheduler - fair-share job leasing for worker clusters
//!
//! This crate provides:
//! - The lease engine driving one `LeaseJobs` call per worker cluster
//! - Priority weights from historical usage and resource scarcity
//! - Per-queue scheduling limits
//! - The repository contract the engine consumes, with an in-memory mock

pub mod config;
pub mod error;
pub mod lease;
pub mod limits;
pub mod mock;
pub mod priority;
pub mod repository;
pub mod types;

// Re-export commonly used types
pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use lease::LeaseEngine;
pub use mock::MockRepository;
pub use repository::{JobRepository, UsageSnapshot};
pub use types::{LeaseRequest, LeaseResponse, QueuePriorityInfo, QueueSchedulingInfo, TerminationReason};
