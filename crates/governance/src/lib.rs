//! Governance for AuditGate.
//!
//! This crate provides:
//! - Quota ledger (per-identity rolling windows, monthly budget, system throttle)
//! - Notarization of result hashes
//! - Distributed tracing setup
//! - Prometheus metrics helpers

pub mod metrics;
pub mod notary;
pub mod quota;
pub mod tracing_layer;

pub use crate::metrics::{
    setup_metrics_recorder, track_analysis_duration, track_cache_event, track_denial,
    track_outcome, track_side_effect_failure,
};
pub use notary::{audit_hash, AnchorRecord, LedgerNotarizer};
pub use quota::{QuotaLedger, QuotaSnapshot, Reservation};
pub use tracing_layer::configure_tracing;
