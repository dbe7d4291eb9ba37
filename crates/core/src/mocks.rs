//! Mock implementations of core traits for testing.
//!
//! These are used across the workspace for deterministic unit and
//! integration tests: a manually driven clock, a scripted analyzer, and
//! recording side-effect collaborators that can be told to fail.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{
    clock::Clock,
    traits::{Analyzer, ArtifactStore, Notarizer, Publisher},
    types::{AnalysisReport, AuditResult, SubjectId},
    Error, Result,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Manual Clock
// =============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock starting at 2025-01-15T12:00:00Z.
    pub fn fixed() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        if let Some(next) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|by| now.checked_add_signed(by))
        {
            *now = next;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *lock(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

// =============================================================================
// Mock Analyzer
// =============================================================================

enum Behavior {
    Report(AnalysisReport),
    Fail(String),
    Panic(String),
}

/// Scripted analyzer that returns a fixed report or error, optionally after
/// a delay, and counts its calls.
pub struct MockAnalyzer {
    name: String,
    behavior: Behavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockAnalyzer {
    /// Analyzer returning `risk_bucket` / `workload_units` with no cost.
    pub fn reporting(risk_bucket: u8, workload_units: u64) -> Self {
        Self {
            name: "mock".to_string(),
            behavior: Behavior::Report(AnalysisReport {
                analyzer: "mock".to_string(),
                findings: vec![],
                summary: format!("mock analysis (risk {risk_bucket})"),
                risk_bucket,
                workload_units,
                cost_lamports: 0,
            }),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Analyzer that always fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            name: "mock".to_string(),
            behavior: Behavior::Fail(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Analyzer that panics with `message`, as a buggy backend would.
    pub fn panicking(message: &str) -> Self {
        Self {
            name: "mock".to_string(),
            behavior: Behavior::Panic(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the cost reported by each successful call.
    pub fn with_cost(mut self, cost_lamports: u64) -> Self {
        if let Behavior::Report(report) = &mut self.behavior {
            report.cost_lamports = cost_lamports;
        }
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        if let Behavior::Report(report) = &mut self.behavior {
            report.analyzer = name.to_string();
        }
        self
    }

    /// Number of `analyze` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, _subject: &SubjectId, _payload: &str) -> Result<AnalysisReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            Behavior::Report(report) => Ok(report.clone()),
            Behavior::Fail(message) => Err(Error::analysis(message.clone())),
            Behavior::Panic(message) => panic!("{message}"),
        }
    }
}

// =============================================================================
// Recording Side Effects
// =============================================================================

/// Artifact store that keeps blobs in memory and can be switched to fail.
#[derive(Default)]
pub struct RecordingArtifactStore {
    puts: Mutex<Vec<(String, Bytes)>>,
    fail: AtomicBool,
}

impl RecordingArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.puts).iter().map(|(k, _)| k.clone()).collect()
    }
}

#[async_trait]
impl ArtifactStore for RecordingArtifactStore {
    async fn put(&self, key: &str, blob: Bytes) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::storage("bucket unavailable"));
        }
        lock(&self.puts).push((key.to_string(), blob));
        Ok(format!("mem://{key}"))
    }
}

/// Notarizer that records anchored hashes.
#[derive(Default)]
pub struct RecordingNotarizer {
    anchors: Mutex<Vec<(String, Value)>>,
    fail: AtomicBool,
}

impl RecordingNotarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notarizer = Self::default();
        notarizer.fail.store(true, Ordering::SeqCst);
        notarizer
    }

    pub fn anchored(&self) -> Vec<String> {
        lock(&self.anchors).iter().map(|(h, _)| h.clone()).collect()
    }
}

#[async_trait]
impl Notarizer for RecordingNotarizer {
    async fn anchor(&self, hash: &str, metadata: &Value) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::notarization("rpc unreachable"));
        }
        lock(&self.anchors)
            .push((hash.to_string(), metadata.clone()));
        Ok(format!("proof-{}", &hash[..hash.len().min(8)]))
    }
}

/// Publisher that records published audit IDs, optionally hanging forever.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<String>>,
    fail: AtomicBool,
    hang: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.fail.store(true, Ordering::SeqCst);
        publisher
    }

    /// Publisher that never answers; used to exercise side-effect timeouts.
    pub fn hanging() -> Self {
        let publisher = Self::default();
        publisher.hang.store(true, Ordering::SeqCst);
        publisher
    }

    pub fn published(&self) -> Vec<String> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, result: &AuditResult) -> Result<String> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::publication("marketplace returned 503"));
        }
        lock(&self.published).push(result.audit_id.clone());
        Ok(format!("ack-{}", result.audit_id))
    }
}
