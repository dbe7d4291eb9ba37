//! Queue of autonomous audit jobs.
//!
//! Jobs wait in FIFO order until the drain loop dispatches them. Only a
//! queued job can be cancelled; once dispatched it runs to completion.
//! Records of finished and cancelled jobs are kept up to a retention limit,
//! oldest dropped first; the aggregate stats cover every job ever seen.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use audit_gate_core::{AuditOutcome, AuditRequest, Clock, Error, Lamports, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Finished { outcome: AuditOutcome },
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Finished { .. } => "finished",
            JobState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub request: AuditRequest,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregate counters over every job seen by the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub cached: u64,
    pub denied: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Sum of fees quoted for completed jobs.
    pub total_fees_lamports: Lamports,
}

/// Terminal job records kept by `JobQueue::new`.
const DEFAULT_RETAINED_JOBS: usize = 1_000;

#[derive(Default)]
struct QueueInner {
    jobs: HashMap<String, Job>,
    order: VecDeque<String>,
    /// Finished and cancelled jobs, oldest first.
    terminal: VecDeque<String>,
    stats: JobStats,
}

impl QueueInner {
    fn retire(&mut self, id: &str, retained: usize) {
        self.terminal.push_back(id.to_string());
        while self.terminal.len() > retained {
            if let Some(old) = self.terminal.pop_front() {
                self.jobs.remove(&old);
            }
        }
    }
}

pub struct JobQueue {
    inner: Mutex<QueueInner>,
    queued: Notify,
    retained: usize,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_retention(clock, DEFAULT_RETAINED_JOBS)
    }

    /// Keep at most `retained` finished or cancelled job records.
    pub fn with_retention(clock: Arc<dyn Clock>, retained: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            queued: Notify::new(),
            retained,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a request and return its job ID.
    pub fn enqueue(&self, request: AuditRequest) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let job = Job {
            id: id.clone(),
            request,
            state: JobState::Queued,
            enqueued_at: self.clock.now(),
            finished_at: None,
        };
        tracing::info!(
            job_id = %id,
            identity = %job.request.identity,
            subject = %job.request.subject,
            "Audit job queued"
        );

        let mut inner = self.lock();
        inner.jobs.insert(id.clone(), job);
        inner.order.push_back(id.clone());
        inner.stats.queued += 1;
        drop(inner);
        self.queued.notify_one();
        id
    }

    /// Resolves once a job has been queued since the last wakeup.
    pub async fn job_queued(&self) {
        self.queued.notified().await;
    }

    /// Cancel a job that has not been dispatched yet.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        if job.state != JobState::Queued {
            return Err(Error::JobNotCancellable {
                id: id.to_string(),
                state: job.state.as_str().to_string(),
            });
        }
        job.state = JobState::Cancelled;
        job.finished_at = Some(now);

        inner.order.retain(|queued| queued != id);
        inner.stats.queued -= 1;
        inner.stats.cancelled += 1;
        inner.retire(id, self.retained);
        tracing::info!(job_id = %id, "Audit job cancelled");
        Ok(())
    }

    pub fn status(&self, id: &str) -> Option<Job> {
        self.lock().jobs.get(id).cloned()
    }

    /// Queued jobs in dispatch order.
    pub fn pending(&self) -> Vec<Job> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    pub fn stats(&self) -> JobStats {
        self.lock().stats
    }

    /// Take the oldest queued job and mark it running.
    pub fn dispatch_next(&self) -> Option<(String, AuditRequest)> {
        let mut inner = self.lock();
        let id = inner.order.pop_front()?;
        let job = inner.jobs.get_mut(&id)?;
        job.state = JobState::Running;
        let request = job.request.clone();
        inner.stats.queued -= 1;
        inner.stats.running += 1;
        tracing::debug!(job_id = %id, "Audit job dispatched");
        Some((id, request))
    }

    /// Record the outcome of a dispatched job.
    pub fn finish(&self, id: &str, outcome: AuditOutcome) {
        let now = self.clock.now();
        let mut inner = self.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            tracing::error!(job_id = %id, "Finished job is unknown");
            return;
        };
        if job.state != JobState::Running {
            tracing::error!(job_id = %id, state = job.state.as_str(), "Finished job was not running");
            return;
        }

        let stats = &mut inner.stats;
        stats.running -= 1;
        match &outcome {
            AuditOutcome::Completed { fee, .. } => {
                stats.completed += 1;
                stats.total_fees_lamports = stats.total_fees_lamports.saturating_add(fee.total_lamports);
            }
            AuditOutcome::Cached { .. } => stats.cached += 1,
            AuditOutcome::Denied { .. } => stats.denied += 1,
            AuditOutcome::Failed { .. } => stats.failed += 1,
        }
        tracing::info!(job_id = %id, outcome = outcome.label(), "Audit job finished");
        if let Some(job) = inner.jobs.get_mut(id) {
            job.state = JobState::Finished { outcome };
            job.finished_at = Some(now);
        }
        inner.retire(id, self.retained);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_gate_core::{mocks::ManualClock, DenialReason, Tier};

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(ManualClock::fixed()))
    }

    #[test]
    fn test_fifo_dispatch() {
        let queue = queue();
        let a = queue.enqueue(AuditRequest::new("alice", "C1", Tier::Free));
        let b = queue.enqueue(AuditRequest::new("bob", "C2", Tier::Free));
        assert_eq!(queue.pending().len(), 2);

        let (first, _) = queue.dispatch_next().unwrap();
        assert_eq!(first, a);
        assert_eq!(queue.status(&a).unwrap().state, JobState::Running);
        assert_eq!(queue.pending()[0].id, b);

        let stats = queue.stats();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.running, 1);
    }

    #[test]
    fn test_cancel_only_queued() {
        let queue = queue();
        let a = queue.enqueue(AuditRequest::new("alice", "C1", Tier::Free));
        let b = queue.enqueue(AuditRequest::new("alice", "C2", Tier::Free));

        queue.cancel(&b).unwrap();
        assert_eq!(queue.status(&b).unwrap().state, JobState::Cancelled);
        assert!(matches!(
            queue.cancel(&b),
            Err(Error::JobNotCancellable { .. })
        ));

        queue.dispatch_next().unwrap();
        assert!(matches!(
            queue.cancel(&a),
            Err(Error::JobNotCancellable { .. })
        ));
        assert!(matches!(queue.cancel("nope"), Err(Error::JobNotFound(_))));

        // The cancelled job is never dispatched.
        assert!(queue.dispatch_next().is_none());
        assert_eq!(queue.stats().cancelled, 1);
    }

    #[test]
    fn test_finish_updates_stats() {
        let queue = queue();
        let a = queue.enqueue(AuditRequest::new("alice", "C1", Tier::Free));
        queue.dispatch_next().unwrap();
        queue.finish(
            &a,
            AuditOutcome::Denied {
                reason: DenialReason::HourlyLimit,
            },
        );

        let job = queue.status(&a).unwrap();
        assert_eq!(job.state.as_str(), "finished");
        assert!(job.finished_at.is_some());
        let stats = queue.stats();
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.running, 0);

        // Finishing twice is ignored.
        queue.finish(
            &a,
            AuditOutcome::Denied {
                reason: DenialReason::HourlyLimit,
            },
        );
        assert_eq!(queue.stats().denied, 1);
    }

    #[test]
    fn test_terminal_records_are_pruned_oldest_first() {
        let queue = JobQueue::with_retention(Arc::new(ManualClock::fixed()), 2);
        let ids: Vec<String> = (0..3)
            .map(|i| queue.enqueue(AuditRequest::new("alice", format!("C{i}"), Tier::Free)))
            .collect();
        let waiting = queue.enqueue(AuditRequest::new("alice", "C9", Tier::Free));

        for id in &ids {
            queue.dispatch_next().unwrap();
            queue.finish(
                id,
                AuditOutcome::Denied {
                    reason: DenialReason::HourlyLimit,
                },
            );
        }

        assert!(queue.status(&ids[0]).is_none());
        assert!(queue.status(&ids[1]).is_some());
        assert!(queue.status(&ids[2]).is_some());
        // Queued jobs are never pruned and stats keep the full history.
        assert_eq!(queue.status(&waiting).unwrap().state, JobState::Queued);
        assert_eq!(queue.stats().denied, 3);

        queue.cancel(&waiting).unwrap();
        assert!(queue.status(&ids[1]).is_none());
        assert_eq!(queue.status(&waiting).unwrap().state, JobState::Cancelled);
    }
}
