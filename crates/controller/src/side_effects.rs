//! Best-effort side effects run after a successful analysis.
//!
//! Storage, notarization and publication run concurrently, each under its
//! own timeout. A failure becomes a warning plus a missing reference; it
//! never changes the outcome of the request.

use bytes::Bytes;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use audit_gate_core::{
    ArtifactStore, AuditResult, Error, FeeQuote, Notarizer, Publisher, Result, SideEffectKind,
    SideEffectRefs, SideEffectWarning,
};
use audit_gate_governance::{audit_hash, track_side_effect_failure};
use audit_gate_store::artifact_key;

/// Configured side-effect collaborators. Any of them may be absent.
#[derive(Clone)]
pub struct SideEffects {
    store: Option<Arc<dyn ArtifactStore>>,
    notarizer: Option<Arc<dyn Notarizer>>,
    publisher: Option<Arc<dyn Publisher>>,
    timeout: Duration,
}

impl SideEffects {
    pub fn new(timeout: Duration) -> Self {
        Self {
            store: None,
            notarizer: None,
            publisher: None,
            timeout,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notarizer(mut self, notarizer: Arc<dyn Notarizer>) -> Self {
        self.notarizer = Some(notarizer);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    async fn guarded<F>(&self, effect: SideEffectKind, fut: F) -> Result<String>
    where
        F: Future<Output = Result<String>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "{} did not finish within {:?}",
                effect.as_str(),
                self.timeout
            ))),
        }
    }

    async fn store(&self, result: &AuditResult, fee: &FeeQuote, hash: &str) -> Option<Result<String>> {
        let store = self.store.as_ref()?;
        let attempt = async {
            let blob = serde_json::to_vec(&json!({
                "result": result,
                "fee": fee,
                "audit_hash": hash,
            }))?;
            let key = artifact_key(&result.subject, &result.audit_id);
            store.put(&key, Bytes::from(blob)).await
        };
        Some(self.guarded(SideEffectKind::Storage, attempt).await)
    }

    async fn anchor(&self, result: &AuditResult, fee: &FeeQuote, hash: Option<&str>) -> Option<Result<String>> {
        let notarizer = self.notarizer.as_ref()?;
        let Some(hash) = hash else {
            return Some(Err(Error::notarization("result could not be hashed")));
        };
        let metadata = json!({
            "audit_id": result.audit_id,
            "subject": result.subject,
            "risk_bucket": result.report.risk_bucket,
            "fee_lamports": fee.total_lamports,
        });
        Some(
            self.guarded(SideEffectKind::Notarization, notarizer.anchor(hash, &metadata))
                .await,
        )
    }

    async fn publish(&self, result: &AuditResult) -> Option<Result<String>> {
        let publisher = self.publisher.as_ref()?;
        Some(
            self.guarded(SideEffectKind::Publication, publisher.publish(result))
                .await,
        )
    }

    /// Run every configured side effect and collect references and warnings.
    pub async fn run(&self, result: &AuditResult, fee: &FeeQuote) -> SideEffectRefs {
        let hash = audit_hash(result);
        if let Err(e) = &hash {
            tracing::warn!(audit_id = %result.audit_id, error = %e, "Failed to hash result");
        }
        let hash = hash.ok();

        let (stored, anchored, published) = tokio::join!(
            self.store(result, fee, hash.as_deref().unwrap_or_default()),
            self.anchor(result, fee, hash.as_deref()),
            self.publish(result),
        );

        let mut refs = SideEffectRefs {
            audit_hash: hash.unwrap_or_default(),
            ..Default::default()
        };
        refs.artifact_url = settle(&mut refs.warnings, result, SideEffectKind::Storage, stored);
        refs.proof_ref = settle(&mut refs.warnings, result, SideEffectKind::Notarization, anchored);
        refs.publish_ack = settle(&mut refs.warnings, result, SideEffectKind::Publication, published);
        refs
    }
}

fn settle(
    warnings: &mut Vec<SideEffectWarning>,
    result: &AuditResult,
    effect: SideEffectKind,
    outcome: Option<Result<String>>,
) -> Option<String> {
    match outcome? {
        Ok(reference) => Some(reference),
        Err(e) => {
            tracing::warn!(
                audit_id = %result.audit_id,
                effect = effect.as_str(),
                error = %e,
                "Side effect failed"
            );
            track_side_effect_failure(effect);
            warnings.push(SideEffectWarning {
                effect,
                message: e.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_gate_core::mocks::{
        ManualClock, RecordingArtifactStore, RecordingNotarizer, RecordingPublisher,
    };
    use audit_gate_core::{AnalysisReport, Clock, Tier};

    fn result() -> AuditResult {
        AuditResult {
            audit_id: "a1".to_string(),
            identity: "alice".into(),
            subject: "EvXNCtaoVuC1".into(),
            tier: Tier::Free,
            report: AnalysisReport {
                analyzer: "mock".to_string(),
                findings: vec![],
                summary: "ok".to_string(),
                risk_bucket: 2,
                workload_units: 10,
                cost_lamports: 0,
            },
            completed_at: ManualClock::fixed().now(),
        }
    }

    fn fee() -> FeeQuote {
        audit_gate_analysis::FeeCalculator::new(Default::default())
            .unwrap()
            .quote(10, 2, Tier::Free)
    }

    #[tokio::test]
    async fn test_all_effects_succeed() {
        let store = Arc::new(RecordingArtifactStore::new());
        let notarizer = Arc::new(RecordingNotarizer::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let effects = SideEffects::new(Duration::from_secs(1))
            .with_store(store.clone())
            .with_notarizer(notarizer.clone())
            .with_publisher(publisher.clone());

        let refs = effects.run(&result(), &fee()).await;
        assert!(refs.warnings.is_empty());
        assert_eq!(refs.artifact_url.as_deref(), Some("mem://audits/EvXNCtao/a1.json"));
        assert!(refs.proof_ref.is_some());
        assert_eq!(refs.publish_ack.as_deref(), Some("ack-a1"));
        assert_eq!(notarizer.anchored(), vec![refs.audit_hash.clone()]);
        assert_eq!(store.keys(), vec!["audits/EvXNCtao/a1.json".to_string()]);
    }

    #[tokio::test]
    async fn test_unconfigured_effects_are_silent() {
        let refs = SideEffects::new(Duration::from_secs(1))
            .run(&result(), &fee())
            .await;
        assert!(refs.warnings.is_empty());
        assert!(refs.artifact_url.is_none());
        assert_eq!(refs.audit_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_failures_become_warnings() {
        let effects = SideEffects::new(Duration::from_secs(1))
            .with_store(Arc::new(RecordingArtifactStore::failing()))
            .with_notarizer(Arc::new(RecordingNotarizer::new()))
            .with_publisher(Arc::new(RecordingPublisher::failing()));

        let refs = effects.run(&result(), &fee()).await;
        assert!(refs.artifact_url.is_none());
        assert!(refs.proof_ref.is_some());
        assert!(refs.publish_ack.is_none());
        let kinds: Vec<_> = refs.warnings.iter().map(|w| w.effect).collect();
        assert_eq!(kinds, vec![SideEffectKind::Storage, SideEffectKind::Publication]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_publisher_times_out() {
        let effects = SideEffects::new(Duration::from_secs(10))
            .with_publisher(Arc::new(RecordingPublisher::hanging()));

        let refs = effects.run(&result(), &fee()).await;
        assert!(refs.publish_ack.is_none());
        assert_eq!(refs.warnings.len(), 1);
        assert!(refs.warnings[0].message.contains("publication"));
    }
}
