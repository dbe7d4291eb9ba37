//! AuditGate - audit request admission, deduplication, pricing and
//! orchestration.
//!
//! The binary wires the pipeline from configuration and drives it from
//! newline-delimited JSON on stdin. Each line is an audit request; lines
//! with `"queue": true` are handed to the background drain loop instead of
//! being processed inline. Outcomes are written to stdout as JSON.

use std::sync::Arc;
use tokio::io::BufReader;

use audit_gate_analysis::RemoteAnalyzer;
use audit_gate_controller::{
    serve_lines, spawn_drain_loop, AuditCoordinatorBuilder, JobQueue, LogPublisher,
    WebhookPublisher,
};
use audit_gate_core::{config::AppConfig, ArtifactStore, Clock, Publisher, SystemClock};
use audit_gate_governance::LedgerNotarizer;
use audit_gate_store::{InMemoryArtifactStore, S3ArtifactStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    audit_gate_governance::configure_tracing(config.logging.json)?;
    let metrics_handle = audit_gate_governance::setup_metrics_recorder()?;

    tracing::info!("Starting AuditGate v{}", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // =========================================================================
    // Side-effect collaborators
    // =========================================================================
    let store: Arc<dyn ArtifactStore> = match S3ArtifactStore::from_config(&config.storage).await {
        Some(s3) => {
            tracing::info!(bucket = ?config.storage.s3_bucket, "Using S3 artifact store");
            Arc::new(s3)
        }
        None => {
            tracing::info!("Using in-memory artifact store");
            Arc::new(match &config.storage.public_base_url {
                Some(base) => {
                    InMemoryArtifactStore::with_base_url(format!("{}/", base.trim_end_matches('/')))
                }
                None => InMemoryArtifactStore::new(),
            })
        }
    };

    let side_effect_timeout = config.coordinator.side_effect_timeout();
    let publisher: Arc<dyn Publisher> = match &config.publisher.webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Publishing results to webhook");
            Arc::new(WebhookPublisher::new(url.clone(), side_effect_timeout)?)
        }
        None => Arc::new(LogPublisher),
    };

    // =========================================================================
    // Coordinator
    // =========================================================================
    let mut builder = AuditCoordinatorBuilder::new()
        .with_config(config.clone())
        .with_clock(clock.clone())
        .with_store(store)
        .with_notarizer(Arc::new(LedgerNotarizer::new(clock.clone())))
        .with_publisher(publisher);
    match RemoteAnalyzer::from_config(&config.analysis, config.coordinator.analysis_timeout())? {
        Some(remote) => {
            tracing::info!("Paid tiers use the remote analyzer");
            builder = builder.with_paid_analyzer(Arc::new(remote));
        }
        None => tracing::warn!("No remote analyzer configured, paid tiers fall back to local analysis"),
    }
    let coordinator = Arc::new(builder.build()?);

    let queue = Arc::new(JobQueue::with_retention(clock.clone(), config.drain.retained_jobs));
    let drain = spawn_drain_loop(coordinator.clone(), queue.clone(), config.drain.clone());

    // =========================================================================
    // Interactive producer
    // =========================================================================
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for interrupts");
            std::future::pending::<()>().await;
        }
    };
    let produced = serve_lines(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        coordinator.clone(),
        queue.clone(),
        interrupted,
    )
    .await?;
    tracing::info!(
        submitted = produced.submitted,
        queued = produced.queued,
        malformed = produced.malformed,
        "Input closed"
    );

    drain.shutdown().await;
    let stats = queue.stats();
    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        cancelled = stats.cancelled,
        total_fees_lamports = stats.total_fees_lamports,
        "AuditGate stopped"
    );
    tracing::debug!(metrics = %metrics_handle.render(), "Final metrics");
    Ok(())
}
