//! Result hashing and the in-process notarizer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use audit_gate_core::{AuditResult, Clock, Notarizer, Result};

/// Hex SHA-256 of the canonical JSON form of `result`.
///
/// Object keys are sorted, so the hash does not depend on field order.
pub fn audit_hash(result: &AuditResult) -> Result<String> {
    let canonical = serde_json::to_value(result)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

/// One anchored hash.
#[derive(Debug, Clone, Serialize)]
pub struct AnchorRecord {
    pub hash: String,
    pub metadata: Value,
    pub proof_ref: String,
    pub anchored_at: DateTime<Utc>,
}

/// Notarizer that keeps anchors in memory and hands back a `prepared:`
/// proof reference. Re-anchoring a hash returns the original proof.
pub struct LedgerNotarizer {
    anchors: DashMap<String, AnchorRecord>,
    clock: Arc<dyn Clock>,
}

impl LedgerNotarizer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            anchors: DashMap::new(),
            clock,
        }
    }

    pub fn get(&self, hash: &str) -> Option<AnchorRecord> {
        self.anchors.get(hash).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[async_trait]
impl Notarizer for LedgerNotarizer {
    async fn anchor(&self, hash: &str, metadata: &Value) -> Result<String> {
        let record = self
            .anchors
            .entry(hash.to_string())
            .or_insert_with(|| AnchorRecord {
                hash: hash.to_string(),
                metadata: metadata.clone(),
                proof_ref: format!("prepared:{}", &hash[..hash.len().min(16)]),
                anchored_at: self.clock.now(),
            });
        tracing::debug!(hash = %hash, proof_ref = %record.proof_ref, "Hash anchored");
        Ok(record.proof_ref.clone())
    }
}
