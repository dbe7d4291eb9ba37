//! Audit coordinator.
//!
//! Runs one request end to end:
//!
//! ```text
//! Admitting ──deny──▶ Denied
//!     │ allow
//!     ▼
//! DedupChecking ──hit──▶ Cached
//!     │ miss
//!     ▼
//! Analyzing ──error/timeout──▶ Failed
//!     │ ok
//!     ▼
//! SideEffects ──▶ Settled ──▶ Completed
//! ```
//!
//! The quota reservation taken at admission is released on every path
//! except `Completed`, where it is settled with the analysis cost. Usage is
//! therefore recorded exactly when admission and analysis both succeeded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use audit_gate_analysis::FeeCalculator;
use audit_gate_core::{
    config::CoordinatorConfig, AnalysisReport, Analyzer, AuditOutcome, AuditRequest,
    AuditResult, CacheEntry, Clock, Error, FailureReason, Tier,
};
use audit_gate_governance::{
    track_analysis_duration, track_cache_event, track_denial, track_outcome, QuotaLedger,
};
use audit_gate_store::DeduplicationCache;

use crate::lanes::SubjectLanes;
use crate::side_effects::SideEffects;

/// Orchestrates admission, deduplication, analysis, side effects and
/// settlement. Shared by every request producer.
pub struct AuditCoordinator {
    pub(crate) ledger: Arc<QuotaLedger>,
    pub(crate) cache: Arc<DeduplicationCache>,
    pub(crate) fees: FeeCalculator,
    pub(crate) free_analyzer: Arc<dyn Analyzer>,
    pub(crate) paid_analyzer: Option<Arc<dyn Analyzer>>,
    pub(crate) side_effects: SideEffects,
    pub(crate) lanes: SubjectLanes,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: CoordinatorConfig,
    pub(crate) dedup_window: Duration,
}

impl AuditCoordinator {
    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    pub fn cache(&self) -> &Arc<DeduplicationCache> {
        &self.cache
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    /// Spend estimate held against the budget while a request runs.
    pub fn estimated_cost(&self, tier: Tier) -> u64 {
        if tier.is_paid() {
            self.config.paid_cost_estimate_lamports
        } else {
            0
        }
    }

    /// Process one request and return its single terminal outcome.
    #[tracing::instrument(
        name = "audit",
        skip_all,
        fields(identity = %request.identity, subject = %request.subject, tier = %request.tier)
    )]
    pub async fn submit(&self, request: AuditRequest) -> AuditOutcome {
        let outcome = self.process(&request).await;
        track_outcome(outcome.label());
        tracing::info!(outcome = outcome.label(), "Audit request finished");
        outcome
    }

    async fn process(&self, request: &AuditRequest) -> AuditOutcome {
        let _lane = self.lanes.acquire(&request.identity, &request.subject).await;

        let reservation = match self.ledger.check_admission(
            &request.identity,
            request.tier,
            self.estimated_cost(request.tier),
        ) {
            Ok(reservation) => reservation,
            Err(reason) => {
                track_denial(&reason);
                return AuditOutcome::Denied { reason };
            }
        };

        match self
            .cache
            .lookup(&request.identity, &request.subject, self.dedup_window)
        {
            Ok(Some(entry)) => {
                track_cache_event("hit");
                reservation.release();
                tracing::info!(audit_id = %entry.audit_id, "Served from dedup cache");
                return AuditOutcome::Cached { entry };
            }
            Ok(None) => track_cache_event("miss"),
            Err(e) => {
                reservation.release();
                return inconsistency("dedup lookup", e);
            }
        }

        let report = match self.analyze(request).await {
            Ok(report) => report,
            Err(reason) => {
                reservation.release();
                tracing::warn!(reason = %reason, "Analysis failed");
                return AuditOutcome::Failed { reason };
            }
        };

        let fee = self
            .fees
            .quote(report.workload_units, report.risk_bucket, request.tier);
        let result = AuditResult {
            audit_id: uuid::Uuid::new_v4().to_string(),
            identity: request.identity.clone(),
            subject: request.subject.clone(),
            tier: request.tier,
            report,
            completed_at: self.clock.now(),
        };

        let side_effects = self.side_effects.run(&result, &fee).await;

        // Usage is recorded last so a failed cache write leaves no trace in
        // the ledger.
        let entry = CacheEntry::from_settlement(&result, &fee, &side_effects, self.clock.now());
        match self.cache.insert(entry) {
            Ok(evicted) => {
                track_cache_event("insert");
                if evicted.is_some() {
                    track_cache_event("eviction");
                }
            }
            Err(e) => {
                reservation.release();
                return inconsistency("cache write", e);
            }
        }
        if let Err(e) = reservation.record_usage(result.report.cost_lamports) {
            return inconsistency("usage recording", e);
        }

        tracing::info!(
            audit_id = %result.audit_id,
            risk_bucket = result.report.risk_bucket,
            fee_lamports = fee.total_lamports,
            warnings = side_effects.warnings.len(),
            "Audit settled"
        );
        AuditOutcome::Completed {
            result,
            fee,
            side_effects,
        }
    }

    fn analyzer_for(&self, tier: Tier) -> &Arc<dyn Analyzer> {
        match (tier.is_paid(), &self.paid_analyzer) {
            (true, Some(paid)) => paid,
            (true, None) => {
                tracing::warn!(tier = %tier, "No paid analyzer configured, using local analysis");
                &self.free_analyzer
            }
            (false, _) => &self.free_analyzer,
        }
    }

    async fn analyze(&self, request: &AuditRequest) -> Result<AnalysisReport, FailureReason> {
        let analyzer = self.analyzer_for(request.tier);
        let timeout = self.config.analysis_timeout();
        tracing::debug!(analyzer = analyzer.name(), "Analyzing");

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            timeout,
            analyzer.analyze(&request.subject, &request.payload),
        )
        .await;
        track_analysis_duration(request.tier, started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(Error::Timeout(detail))) => Err(FailureReason::Timeout(detail)),
            Ok(Err(e)) => Err(FailureReason::Analysis(e.to_string())),
            Err(_) => Err(FailureReason::Timeout(format!(
                "{} did not answer within {:?}",
                analyzer.name(),
                timeout
            ))),
        }
    }
}

fn inconsistency(stage: &str, error: Error) -> AuditOutcome {
    tracing::error!(stage, error = %error, "Internal inconsistency, failing request");
    AuditOutcome::Failed {
        reason: FailureReason::InternalInconsistency(format!("{stage}: {error}")),
    }
}
