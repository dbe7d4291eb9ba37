use serde::{Deserialize, Serialize};
use std::fmt;

use super::identity::{IdentityId, Tier};

// =============================================================================
// Request Types
// =============================================================================

/// Identifier of the artifact being analyzed (e.g. a contract address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used for artifact keys and log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single "audit this subject" request, regardless of which producer
/// (interactive command, webhook, or background drain) submitted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    /// Requesting principal.
    pub identity: IdentityId,
    /// Subject to analyze.
    pub subject: SubjectId,
    /// Tier the request is billed and routed under.
    pub tier: Tier,
    /// Raw content handed to the analyzer (source code, bytecode, ...).
    #[serde(default)]
    pub payload: String,
}

impl AuditRequest {
    /// Create a request with an empty payload.
    pub fn new(identity: impl Into<IdentityId>, subject: impl Into<SubjectId>, tier: Tier) -> Self {
        Self {
            identity: identity.into(),
            subject: subject.into(),
            tier,
            payload: String::new(),
        }
    }

    /// Attach the content to analyze.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_short() {
        assert_eq!(SubjectId::from("EvXNCtaoVuC1NQLQ").short(), "EvXNCtao");
        assert_eq!(SubjectId::from("C1").short(), "C1");
    }
}
