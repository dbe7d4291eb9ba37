use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::analysis::AnalysisReport;
use super::cache::CacheEntry;
use super::fee::FeeQuote;
use super::identity::{IdentityId, Tier};
use super::request::SubjectId;

// =============================================================================
// Outcome Types
// =============================================================================

/// Why an admission check refused a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DenialReason {
    HourlyLimit,
    DailyLimit,
    MonthlyLimit,
    BudgetLimit,
    SystemThrottle,
    /// The ledger could not evaluate the request and failed closed.
    Internal(String),
}

impl DenialReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::HourlyLimit => "hourly limit",
            DenialReason::DailyLimit => "daily limit",
            DenialReason::MonthlyLimit => "monthly limit",
            DenialReason::BudgetLimit => "budget limit",
            DenialReason::SystemThrottle => "system throttle",
            DenialReason::Internal(_) => "internal error",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Internal(detail) => write!(f, "{}: {}", self.code(), detail),
            _ => f.write_str(self.code()),
        }
    }
}

/// Why a request failed after admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The analyzer returned an error.
    Analysis(String),
    /// The analyzer did not answer in time.
    Timeout(String),
    /// Ledger or cache state was found corrupted.
    InternalInconsistency(String),
}

impl FailureReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Analysis(_) => "analysis error",
            FailureReason::Timeout(_) => "analysis timeout",
            FailureReason::InternalInconsistency(_) => "internal inconsistency",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Analysis(d)
            | FailureReason::Timeout(d)
            | FailureReason::InternalInconsistency(d) => write!(f, "{}: {}", self.code(), d),
        }
    }
}

/// Best-effort side effect fanned out after analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectKind {
    Storage,
    Notarization,
    Publication,
}

impl SideEffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SideEffectKind::Storage => "storage",
            SideEffectKind::Notarization => "notarization",
            SideEffectKind::Publication => "publication",
        }
    }
}

/// A non-fatal side-effect failure attached to a completed outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffectWarning {
    pub effect: SideEffectKind,
    pub message: String,
}

/// References produced by the side-effect stage.
///
/// A `None` reference means the effect was not configured, failed, or timed
/// out; failures are listed in `warnings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffectRefs {
    /// Hex SHA-256 of the canonical result.
    pub audit_hash: String,
    pub artifact_url: Option<String>,
    pub proof_ref: Option<String>,
    pub publish_ack: Option<String>,
    pub warnings: Vec<SideEffectWarning>,
}

/// A successful analysis bound to the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    pub audit_id: String,
    pub identity: IdentityId,
    pub subject: SubjectId,
    pub tier: Tier,
    pub report: AnalysisReport,
    pub completed_at: DateTime<Utc>,
}

/// Terminal result of one submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Refused before the cache or analysis was consulted.
    Denied { reason: DenialReason },
    /// Served from the deduplication cache; nothing was recorded.
    Cached { entry: CacheEntry },
    /// Analysis ran and was settled.
    Completed {
        result: AuditResult,
        fee: FeeQuote,
        side_effects: SideEffectRefs,
    },
    /// Analysis (or settlement bookkeeping) failed.
    Failed { reason: FailureReason },
}

impl AuditOutcome {
    /// Outcome label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            AuditOutcome::Denied { .. } => "denied",
            AuditOutcome::Cached { .. } => "cached",
            AuditOutcome::Completed { .. } => "completed",
            AuditOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AuditOutcome::Completed { .. })
    }

    pub fn denial_reason(&self) -> Option<&DenialReason> {
        match self {
            AuditOutcome::Denied { reason } => Some(reason),
            _ => None,
        }
    }

    /// Risk bucket of the result, if the outcome carries one.
    pub fn risk_bucket(&self) -> Option<u8> {
        match self {
            AuditOutcome::Cached { entry } => Some(entry.risk_bucket),
            AuditOutcome::Completed { result, .. } => Some(result.report.risk_bucket),
            _ => None,
        }
    }
}
