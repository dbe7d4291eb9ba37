//! Core types, traits, and error definitions for AuditGate.
//!
//! This crate provides the foundational building blocks shared by the
//! admission, deduplication, pricing, and orchestration layers.

pub mod clock;
pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
