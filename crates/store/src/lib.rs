//! Storage for AuditGate.
//!
//! This crate provides the deduplication cache of completed audits and the
//! artifact stores results are uploaded to.

pub mod dedup;
pub mod memory;
pub mod s3;

use audit_gate_core::SubjectId;

pub use dedup::{CacheStats, DeduplicationCache};
pub use memory::InMemoryArtifactStore;
pub use s3::S3ArtifactStore;

/// Object key for a result artifact: `audits/{subject prefix}/{audit id}.json`.
pub fn artifact_key(subject: &SubjectId, audit_id: &str) -> String {
    format!("audits/{}/{}.json", subject.short(), audit_id)
}
