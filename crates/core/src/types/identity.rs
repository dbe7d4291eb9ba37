use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// =============================================================================
// Identity Types
// =============================================================================

/// Service level controlling quota and pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Local pattern analysis only, tight quotas.
    #[default]
    Free,
    /// Paid analysis with a subscription discount.
    Subscriber,
    /// Paid analysis with the largest quotas.
    Premium,
}

impl Tier {
    /// Stable lowercase name used in logs, metrics, and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Subscriber => "subscriber",
            Tier::Premium => "premium",
        }
    }

    /// Whether requests on this tier are routed to the paid analyzer.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "subscriber" => Ok(Tier::Subscriber),
            "premium" => Ok(Tier::Premium),
            other => Err(Error::invalid_request(format!("unknown tier: {other}"))),
        }
    }
}

/// Identifier of the principal making requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A requester known to the ledger.
///
/// Created lazily on the first admission check with the tier carried by that
/// request, and kept for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Identity ID.
    pub id: IdentityId,
    /// Current tier. Changes apply to the next admission check.
    pub tier: Tier,
    /// When the ledger first saw this identity.
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(id: IdentityId, tier: Tier, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            tier,
            created_at,
        }
    }
}
