//! Error types for AuditGate.

use thiserror::Error;

/// Result type alias using AuditGate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for AuditGate.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Ledger Errors
    // =========================================================================
    #[error("Quota ledger error: {0}")]
    Ledger(String),

    // =========================================================================
    // Cache Errors
    // =========================================================================
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    // =========================================================================
    // Analysis Errors
    // =========================================================================
    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // Side Effect Errors
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Notarization error: {0}")]
    Notarization(String),

    #[error("Publication error: {0}")]
    Publication(String),

    // =========================================================================
    // Job Queue Errors
    // =========================================================================
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} cannot be cancelled in state {state}")]
    JobNotCancellable { id: String, state: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a ledger error.
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Create an internal inconsistency error.
    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Self::InternalInconsistency(msg.into())
    }

    /// Create an analysis error.
    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a notarization error.
    pub fn notarization(msg: impl Into<String>) -> Self {
        Self::Notarization(msg.into())
    }

    /// Create a publication error.
    pub fn publication(msg: impl Into<String>) -> Self {
        Self::Publication(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
