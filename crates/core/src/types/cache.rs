use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fee::{FeeQuote, Lamports};
use super::identity::IdentityId;
use super::outcome::{AuditResult, SideEffectRefs};
use super::request::SubjectId;

/// Maximum length of the summary kept in a cache entry.
pub const SUMMARY_MAX_CHARS: usize = 100;

/// A recently completed audit, kept for deduplication and history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub audit_id: String,
    pub identity: IdentityId,
    pub subject: SubjectId,
    pub inserted_at: DateTime<Utc>,
    pub risk_bucket: u8,
    /// Truncated result summary.
    pub summary: String,
    pub workload_units: u64,
    pub fee_lamports: Lamports,
    pub artifact_url: Option<String>,
    pub proof_ref: Option<String>,
}

impl CacheEntry {
    /// Build the entry written at settlement time.
    pub fn from_settlement(
        result: &AuditResult,
        fee: &FeeQuote,
        refs: &SideEffectRefs,
        inserted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            audit_id: result.audit_id.clone(),
            identity: result.identity.clone(),
            subject: result.subject.clone(),
            inserted_at,
            risk_bucket: result.report.risk_bucket,
            summary: truncate_summary(&result.report.summary),
            workload_units: result.report.workload_units,
            fee_lamports: fee.total_lamports,
            artifact_url: refs.artifact_url.clone(),
            proof_ref: refs.proof_ref.clone(),
        }
    }
}

fn truncate_summary(summary: &str) -> String {
    match summary.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &summary[..idx]),
        None => summary.to_string(),
    }
}
