//! Collaborator traits for AuditGate.
//!
//! The coordinator only talks to the outside world through these seams:
//! - `analysis`: the free and paid analyzers
//! - `side_effects`: artifact storage, notarization, and publication

pub mod analysis;
pub mod side_effects;

pub use analysis::*;
pub use side_effects::*;
