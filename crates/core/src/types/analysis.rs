use serde::{Deserialize, Serialize};

use super::fee::Lamports;

// =============================================================================
// Analysis Types
// =============================================================================

/// Lowest risk classification.
pub const MIN_RISK_BUCKET: u8 = 1;

/// Highest risk classification.
pub const MAX_RISK_BUCKET: u8 = 10;

/// Clamp a raw risk score into `[MIN_RISK_BUCKET, MAX_RISK_BUCKET]`.
pub fn clamp_risk_bucket(raw: i64) -> u8 {
    raw.clamp(MIN_RISK_BUCKET as i64, MAX_RISK_BUCKET as i64) as u8
}

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// A single issue reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Short machine name (e.g. "reentrancy").
    pub name: String,
    pub severity: Severity,
    pub description: String,
    pub remediation: String,
    /// How many times the issue was observed.
    pub occurrences: u32,
}

/// Output of an [`Analyzer`](crate::traits::Analyzer) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Name of the analyzer that produced the report.
    pub analyzer: String,
    /// Structured findings (may be empty).
    pub findings: Vec<Finding>,
    /// Human-readable summary.
    pub summary: String,
    /// Risk classification in `1..=10`.
    pub risk_bucket: u8,
    /// Workload size used for pricing (tokens, lines, ...).
    pub workload_units: u64,
    /// Cost actually incurred producing this report.
    pub cost_lamports: Lamports,
}
