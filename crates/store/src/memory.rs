//! Artifact store kept in process memory.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use audit_gate_core::{traits::ArtifactStore, Result};

/// Artifacts keyed by path, shared across tasks.
///
/// Used when no object storage is configured, and in tests.
#[derive(Debug)]
pub struct InMemoryArtifactStore {
    data: DashMap<String, Bytes>,
    base_url: String,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::with_base_url("mem://")
    }

    /// URLs are `{base_url}{key}`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            data: DashMap::new(),
            base_url: base_url.into(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.data.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sum of stored blob sizes in bytes.
    pub fn memory_usage(&self) -> usize {
        self.data.iter().map(|r| r.value().len()).sum()
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, key: &str, blob: Bytes) -> Result<String> {
        tracing::debug!(key = %key, size = blob.len(), "Storing artifact in memory");
        self.data.insert(key.to_string(), blob);
        Ok(format!("{}{}", self.base_url, key))
    }
}
