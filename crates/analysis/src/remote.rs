//! Paid remote analyzer.
//!
//! Posts the (size-capped) payload as JSON to an analysis endpoint and maps
//! the answer into an [`AnalysisReport`]. The provider cost is reported back
//! so the ledger can charge it against the monthly budget.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use audit_gate_core::{
    clamp_risk_bucket, config::AnalysisConfig, AnalysisReport, Analyzer, Error, Finding,
    Lamports, Result, SubjectId,
};

const TRUNCATION_MARKER: &str = "\n[... truncated]";

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    subject: &'a str,
    payload: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    findings: Vec<Finding>,
    #[serde(default)]
    summary: String,
    risk_score: i64,
    workload_units: Option<u64>,
    cost_lamports: Option<Lamports>,
}

/// Cut `payload` to at most `max_bytes` on a char boundary.
fn truncate_payload(payload: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if payload.len() <= max_bytes {
        return payload.into();
    }
    let mut end = max_bytes;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &payload[..end], TRUNCATION_MARKER).into()
}

/// JSON-over-HTTP analyzer used by paid tiers.
pub struct RemoteAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<Secret<String>>,
    max_payload_bytes: usize,
    cost_per_unit: Lamports,
}

impl RemoteAnalyzer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<Secret<String>>,
        max_payload_bytes: usize,
        cost_per_unit: Lamports,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            max_payload_bytes,
            cost_per_unit,
        })
    }

    /// Build from the `analysis` config section; `None` without an endpoint.
    pub fn from_config(config: &AnalysisConfig, timeout: Duration) -> Result<Option<Self>> {
        config
            .remote_endpoint
            .as_ref()
            .map(|endpoint| {
                Self::new(
                    endpoint.clone(),
                    config.remote_api_key.clone(),
                    config.max_payload_bytes,
                    config.remote_cost_per_unit_lamports,
                    timeout,
                )
            })
            .transpose()
    }

    fn build_report(&self, response: AnalyzeResponse, sent_bytes: usize) -> AnalysisReport {
        let workload_units = response.workload_units.unwrap_or(sent_bytes as u64);
        let cost_lamports = response
            .cost_lamports
            .unwrap_or_else(|| workload_units.saturating_mul(self.cost_per_unit));
        AnalysisReport {
            analyzer: self.name().to_string(),
            findings: response.findings,
            summary: response.summary,
            risk_bucket: clamp_risk_bucket(response.risk_score),
            workload_units,
            cost_lamports,
        }
    }
}

#[async_trait]
impl Analyzer for RemoteAnalyzer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn analyze(&self, subject: &SubjectId, payload: &str) -> Result<AnalysisReport> {
        let payload = truncate_payload(payload, self.max_payload_bytes);
        if matches!(payload, std::borrow::Cow::Owned(_)) {
            tracing::warn!(
                subject = %subject,
                max_bytes = self.max_payload_bytes,
                "Payload too large, truncated"
            );
        }

        let mut request = self.client.post(&self.endpoint).json(&AnalyzeRequest {
            subject: subject.as_str(),
            payload: &payload,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("remote analyzer: {}", e))
                } else {
                    Error::analysis(format!("remote analyzer request failed: {}", e))
                }
            })?
            .error_for_status()
            .map_err(|e| Error::analysis(format!("remote analyzer returned error: {}", e)))?
            .json::<AnalyzeResponse>()
            .await
            .map_err(|e| Error::analysis(format!("remote analyzer response invalid: {}", e)))?;

        let report = self.build_report(response, payload.len());
        tracing::info!(
            subject = %subject,
            risk_bucket = report.risk_bucket,
            workload_units = report.workload_units,
            cost_lamports = report.cost_lamports,
            "Remote analysis complete"
        );
        Ok(report)
    }
}
