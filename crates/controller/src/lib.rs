//! Orchestration for AuditGate.
//!
//! This crate provides the audit coordinator shared by every request
//! producer, the best-effort side-effect fan-out, the line-oriented
//! producer, and the autonomous job queue with its background drain loop.

pub mod builder;
pub mod coordinator;
pub mod drain;
pub mod jobs;
pub mod lanes;
pub mod producer;
pub mod publisher;
pub mod side_effects;

pub use builder::AuditCoordinatorBuilder;
pub use coordinator::AuditCoordinator;
pub use drain::{drain_once, spawn_drain_loop, DrainHandle};
pub use jobs::{Job, JobQueue, JobState, JobStats};
pub use lanes::SubjectLanes;
pub use producer::{serve_lines, ProducerStats};
pub use publisher::{LogPublisher, WebhookPublisher};
pub use side_effects::SideEffects;
