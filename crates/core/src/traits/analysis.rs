//! Analyzer trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AnalysisReport, SubjectId};

/// Content analyzer.
///
/// Two implementations share this contract: a local zero-cost pattern
/// matcher that never fails, and a paid remote analyzer that may time out or
/// return an upstream error.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyzer name recorded in reports and logs.
    fn name(&self) -> &str;

    /// Analyze `payload` for `subject`.
    async fn analyze(&self, subject: &SubjectId, payload: &str) -> Result<AnalysisReport>;
}
