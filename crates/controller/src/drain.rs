//! Background drain loop for autonomous jobs.
//!
//! On every tick the loop dispatches queued jobs to a bounded worker pool.
//! A worker slot is acquired before a job leaves the queue, so jobs stay
//! cancellable until a worker is actually free. While workers are busy the
//! iteration keeps picking up newly queued jobs; it ends once the queue is
//! empty and every worker has finished.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use audit_gate_core::{config::DrainConfig, AuditOutcome, FailureReason};

use crate::coordinator::AuditCoordinator;
use crate::jobs::JobQueue;

/// Handle to a running drain loop.
pub struct DrainHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DrainHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Drain loop task ended abnormally");
        }
    }
}

/// Spawn the drain loop.
pub fn spawn_drain_loop(
    coordinator: Arc<AuditCoordinator>,
    queue: Arc<JobQueue>,
    config: DrainConfig,
) -> DrainHandle {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let task = tokio::spawn(async move {
        run_drain_loop(coordinator, queue, config, cancel_clone).await;
    });

    DrainHandle { cancel, task }
}

async fn run_drain_loop(
    coordinator: Arc<AuditCoordinator>,
    queue: Arc<JobQueue>,
    config: DrainConfig,
    cancel: CancellationToken,
) {
    let workers = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let mut ticker = interval(config.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        interval_secs = config.interval().as_secs(),
        max_concurrent = config.max_concurrent,
        "Drain loop started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Drain loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                drain_once(&coordinator, &queue, &workers, &cancel).await;
            }
        }
    }
}

/// Dispatch queued jobs through the worker pool until the queue is empty
/// and no worker is running.
///
/// Returns the number of jobs dispatched.
pub async fn drain_once(
    coordinator: &Arc<AuditCoordinator>,
    queue: &Arc<JobQueue>,
    workers: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> usize {
    let mut running = JoinSet::new();
    let mut dispatched = 0;

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = workers.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let Some((job_id, request)) = queue.dispatch_next() else {
            drop(permit);
            if running.is_empty() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                joined = running.join_next() => log_join(joined),
                _ = queue.job_queued() => {}
            }
            continue;
        };
        dispatched += 1;

        let coordinator = coordinator.clone();
        let queue = queue.clone();
        running.spawn(async move {
            // The audit runs in its own task so a panic still finishes the job.
            let outcome = match tokio::spawn(async move { coordinator.submit(request).await }).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Audit job worker panicked");
                    AuditOutcome::Failed {
                        reason: FailureReason::InternalInconsistency(format!("worker failed: {e}")),
                    }
                }
            };
            queue.finish(&job_id, outcome);
            drop(permit);
        });
    }

    while let Some(joined) = running.join_next().await {
        log_join(Some(joined));
    }

    if dispatched > 0 {
        let stats = queue.stats();
        info!(
            dispatched,
            completed = stats.completed,
            failed = stats.failed,
            total_fees_lamports = stats.total_fees_lamports,
            "Drain iteration completed"
        );
    } else {
        debug!("Drain iteration: no queued jobs");
    }
    dispatched
}

fn log_join(joined: Option<Result<(), tokio::task::JoinError>>) {
    if let Some(Err(e)) = joined {
        warn!(error = %e, "Drain worker ended abnormally");
    }
}
