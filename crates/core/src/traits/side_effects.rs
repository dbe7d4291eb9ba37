//! Side-effect collaborator traits.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::error::Result;
use crate::types::AuditResult;

/// Object storage for result artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `blob` under `key` and return a URL for it.
    async fn put(&self, key: &str, blob: Bytes) -> Result<String>;
}

/// Anchors a result hash somewhere tamper-evident.
#[async_trait]
pub trait Notarizer: Send + Sync {
    /// Anchor `hash` with `metadata` and return a proof reference.
    async fn anchor(&self, hash: &str, metadata: &Value) -> Result<String>;
}

/// Announces completed results to an external audience.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `result` and return an acknowledgement token.
    async fn publish(&self, result: &AuditResult) -> Result<String>;
}
