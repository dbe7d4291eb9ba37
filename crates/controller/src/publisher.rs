//! Publishers for completed audits.

use async_trait::async_trait;
use std::time::Duration;

use audit_gate_core::{AuditResult, Error, Publisher, Result};

/// Posts each result as JSON to a webhook.
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(&self, result: &AuditResult) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(result)
            .send()
            .await
            .map_err(|e| Error::publication(format!("webhook request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::publication(format!("webhook rejected result: {}", e)))?;

        tracing::debug!(audit_id = %result.audit_id, status = %response.status(), "Result published");
        Ok(format!("webhook:{}", response.status().as_u16()))
    }
}

/// Writes a log line per result. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, result: &AuditResult) -> Result<String> {
        tracing::info!(
            audit_id = %result.audit_id,
            subject = %result.subject,
            risk_bucket = result.report.risk_bucket,
            "Audit published"
        );
        Ok(format!("logged:{}", result.audit_id))
    }
}
