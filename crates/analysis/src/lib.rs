//! Pricing and analysis backends for AuditGate.
//!
//! - `pricing`: the fee calculator
//! - `pattern`: zero-cost local pattern analyzer used by the Free tier
//! - `remote`: paid JSON-over-HTTP analyzer used by paid tiers

pub mod pattern;
pub mod pricing;
pub mod remote;

pub use pattern::PatternAnalyzer;
pub use pricing::FeeCalculator;
pub use remote::RemoteAnalyzer;
