//! Core type definitions for AuditGate.
//!
//! Broken down into submodules by concern; everything is re-exported here.

pub mod analysis;
pub mod cache;
pub mod fee;
pub mod identity;
pub mod outcome;
pub mod request;

pub use analysis::*;
pub use cache::*;
pub use fee::*;
pub use identity::*;
pub use outcome::*;
pub use request::*;
