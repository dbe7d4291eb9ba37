//! Local pattern analyzer.
//!
//! Scans the payload with a fixed set of case-insensitive regexes. No I/O,
//! no cost, and `analyze` never fails.

use async_trait::async_trait;
use regex::Regex;

use audit_gate_core::{
    clamp_risk_bucket, AnalysisReport, Analyzer, Error, Finding, Result, Severity, SubjectId,
};

/// Bucket floor when any critical pattern matched.
const CRITICAL_RISK_FLOOR: u8 = 6;

struct PatternDef {
    name: &'static str,
    severity: Severity,
    regex: &'static str,
    /// Matches whose remaining line contains this marker are ignored.
    unless_followed_by: Option<&'static str>,
    description: &'static str,
    remediation: &'static str,
}

const PATTERNS: &[PatternDef] = &[
    PatternDef {
        name: "reentrancy",
        severity: Severity::Critical,
        regex: r"(call|transfer).*\.value|\.send\(|selfdestruct",
        unless_followed_by: None,
        description: "Potential reentrancy through an unsafe external call",
        remediation: "Apply checks-effects-interactions or a reentrancy guard",
    },
    PatternDef {
        name: "unchecked_call",
        severity: Severity::Critical,
        regex: r"call\(|callcode\(|delegatecall\(",
        unless_followed_by: None,
        description: "External call result may be ignored",
        remediation: "Check the returned success flag",
    },
    PatternDef {
        name: "delegatecall",
        severity: Severity::Critical,
        regex: r"delegatecall\(",
        unless_followed_by: None,
        description: "delegatecall executes foreign code in this contract's context",
        remediation: "Restrict targets and verify storage layout",
    },
    PatternDef {
        name: "overflow",
        severity: Severity::High,
        regex: r"\+\+|--|\+=|-=",
        unless_followed_by: Some("safemath"),
        description: "Arithmetic that may overflow or underflow",
        remediation: "Use checked arithmetic",
    },
    PatternDef {
        name: "access_control",
        severity: Severity::Critical,
        regex: r"(function|modifier).*|onlyowner.*modifier",
        unless_followed_by: None,
        description: "Entry point whose access control should be reviewed",
        remediation: "Add explicit visibility and role checks",
    },
    PatternDef {
        name: "selfdestruct",
        severity: Severity::High,
        regex: r"selfdestruct\(",
        unless_followed_by: None,
        description: "Contract can be destroyed",
        remediation: "Restrict selfdestruct to authorized callers",
    },
    PatternDef {
        name: "hardcoded_state",
        severity: Severity::Medium,
        regex: r"=\s*0x[0-9a-f]+;|=\s*[0-9]+;",
        unless_followed_by: None,
        description: "Hardcoded values in contract state",
        remediation: "Pass values through the constructor or configuration",
    },
    PatternDef {
        name: "missing_validation",
        severity: Severity::Medium,
        regex: r"require\(|assert\(|if\(",
        unless_followed_by: None,
        description: "Input validation sites to review",
        remediation: "Validate every user-controlled input",
    },
];

/// Weight in half points, so Low can be 0.5.
fn half_weight(severity: Severity) -> u64 {
    match severity {
        Severity::Critical => 6,
        Severity::High => 4,
        Severity::Medium => 2,
        Severity::Low => 1,
    }
}

struct CompiledPattern {
    def: &'static PatternDef,
    regex: Regex,
}

impl CompiledPattern {
    fn count(&self, payload: &str) -> u32 {
        self.regex
            .find_iter(payload)
            .filter(|m| match self.def.unless_followed_by {
                Some(marker) => {
                    let rest = &payload[m.end()..];
                    let line = rest.split('\n').next().unwrap_or_default();
                    !line.to_ascii_lowercase().contains(marker)
                }
                None => true,
            })
            .count() as u32
    }
}

/// Zero-cost regex analyzer for the Free tier.
pub struct PatternAnalyzer {
    patterns: Vec<CompiledPattern>,
}

impl PatternAnalyzer {
    pub fn new() -> Result<Self> {
        let patterns = PATTERNS
            .iter()
            .map(|def| {
                Regex::new(&format!("(?im){}", def.regex))
                    .map(|regex| CompiledPattern { def, regex })
                    .map_err(|e| Error::config(format!("invalid pattern {}: {}", def.name, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    fn findings(&self, payload: &str) -> Vec<Finding> {
        self.patterns
            .iter()
            .filter_map(|p| {
                let occurrences = p.count(payload);
                (occurrences > 0).then(|| Finding {
                    name: p.def.name.to_string(),
                    severity: p.def.severity,
                    description: p.def.description.to_string(),
                    remediation: p.def.remediation.to_string(),
                    occurrences,
                })
            })
            .collect()
    }

    /// Sum of severity weights times occurrences, clamped to `1..=10`.
    /// Any critical match lifts the result to at least 6.
    pub fn risk_bucket(findings: &[Finding]) -> u8 {
        let half_points: u64 = findings
            .iter()
            .map(|f| half_weight(f.severity) * f.occurrences as u64)
            .sum();
        let bucket = clamp_risk_bucket((half_points / 2).min(i64::MAX as u64) as i64);
        if findings.iter().any(|f| f.severity == Severity::Critical) {
            bucket.max(CRITICAL_RISK_FLOOR)
        } else {
            bucket
        }
    }

    fn summarize(findings: &[Finding], risk_bucket: u8) -> String {
        if findings.is_empty() {
            return "No known vulnerability patterns detected".to_string();
        }
        let mut sorted: Vec<&Finding> = findings.iter().collect();
        sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
        let issues = sorted
            .iter()
            .map(|f| format!("{} ({} x{})", f.name, f.severity.as_str(), f.occurrences))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Risk {}/10: {}", risk_bucket, issues)
    }
}

#[async_trait]
impl Analyzer for PatternAnalyzer {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn analyze(&self, subject: &SubjectId, payload: &str) -> Result<AnalysisReport> {
        let findings = self.findings(payload);
        let risk_bucket = Self::risk_bucket(&findings);
        tracing::debug!(
            subject = %subject,
            risk_bucket,
            patterns = findings.len(),
            "Pattern analysis complete"
        );

        Ok(AnalysisReport {
            analyzer: self.name().to_string(),
            summary: Self::summarize(&findings, risk_bucket),
            findings,
            risk_bucket,
            workload_units: payload.len() as u64,
            cost_lamports: 0,
        })
    }
}
