//! Metrics implementation using Prometheus.

use audit_gate_core::{DenialReason, Error, Result, SideEffectKind, Tier};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::config(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Count one terminal outcome (`denied`, `cached`, `completed`, `failed`).
pub fn track_outcome(outcome: &'static str) {
    metrics::counter!("audit_outcomes_total", "outcome" => outcome).increment(1);
}

pub fn track_denial(reason: &DenialReason) {
    metrics::counter!("audit_admission_denied_total", "reason" => reason.code()).increment(1);
}

/// Count a cache event (`hit`, `miss`, `insert`, `eviction`).
pub fn track_cache_event(event: &'static str) {
    metrics::counter!("audit_cache_events_total", "event" => event).increment(1);
}

pub fn track_side_effect_failure(effect: SideEffectKind) {
    metrics::counter!("audit_side_effect_failures_total", "effect" => effect.as_str())
        .increment(1);
}

/// Record how long one analyzer call took.
pub fn track_analysis_duration(tier: Tier, latency_sec: f64) {
    metrics::histogram!("audit_analysis_duration_seconds", "tier" => tier.as_str())
        .record(latency_sec);
}
