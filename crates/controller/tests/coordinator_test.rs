//! End-to-end coordinator behavior with mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use audit_gate_analysis::RemoteAnalyzer;
use audit_gate_controller::{AuditCoordinator, AuditCoordinatorBuilder};
use audit_gate_core::config::AppConfig;
use audit_gate_core::mocks::{
    ManualClock, MockAnalyzer, RecordingArtifactStore, RecordingNotarizer, RecordingPublisher,
};
use audit_gate_core::{
    AuditOutcome, AuditRequest, DenialReason, FailureReason, IdentityId, SideEffectKind, Tier,
};

fn builder(clock: &Arc<ManualClock>, analyzer: Arc<MockAnalyzer>) -> AuditCoordinatorBuilder {
    AuditCoordinatorBuilder::new()
        .with_clock(clock.clone())
        .with_free_analyzer(analyzer)
}

fn free(identity: &str, subject: &str) -> AuditRequest {
    AuditRequest::new(identity, subject, Tier::Free).with_payload("contract Vault {}")
}

#[tokio::test]
async fn test_hourly_limit_denies_third_request() {
    let clock = Arc::new(ManualClock::fixed());
    let analyzer = Arc::new(MockAnalyzer::reporting(3, 100));
    let coordinator = builder(&clock, analyzer.clone()).build().unwrap();

    let first = coordinator.submit(free("alice", "C1")).await;
    let second = coordinator.submit(free("alice", "C2")).await;
    let third = coordinator.submit(free("alice", "C3")).await;

    assert!(first.is_completed());
    assert!(second.is_completed());
    assert_eq!(third.denial_reason(), Some(&DenialReason::HourlyLimit));
    assert_eq!(third.denial_reason().unwrap().to_string(), "hourly limit");
    assert_eq!(analyzer.call_count(), 2);

    let snapshot = coordinator.ledger().snapshot(&IdentityId::from("alice"));
    assert_eq!(snapshot.used_hour, 2);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn test_resubmission_is_served_from_cache() {
    let clock = Arc::new(ManualClock::fixed());
    let analyzer = Arc::new(MockAnalyzer::reporting(7, 100));
    let coordinator = builder(&clock, analyzer.clone()).build().unwrap();

    let first = coordinator.submit(free("alice", "C1")).await;
    clock.advance(Duration::from_secs(600));
    let second = coordinator.submit(free("alice", "C1")).await;

    assert!(first.is_completed());
    match &second {
        AuditOutcome::Cached { entry } => {
            assert_eq!(entry.risk_bucket, 7);
            assert_eq!(Some(entry.risk_bucket), first.risk_bucket());
        }
        other => panic!("expected cache hit, got {other:?}"),
    }
    assert_eq!(analyzer.call_count(), 1);
    // A cache hit records no usage.
    let snapshot = coordinator.ledger().snapshot(&IdentityId::from("alice"));
    assert_eq!(snapshot.used_hour, 1);
    assert_eq!(coordinator.cache().stats().unwrap().hits, 1);
}

#[tokio::test]
async fn test_stale_entry_is_reanalyzed() {
    let clock = Arc::new(ManualClock::fixed());
    let analyzer = Arc::new(MockAnalyzer::reporting(2, 100));
    let coordinator = builder(&clock, analyzer.clone()).build().unwrap();

    assert!(coordinator.submit(free("alice", "C1")).await.is_completed());
    clock.advance(Duration::from_secs(24 * 3600 + 1));
    assert!(coordinator.submit(free("alice", "C1")).await.is_completed());
    assert_eq!(analyzer.call_count(), 2);
}

#[tokio::test]
async fn test_dedup_is_per_identity() {
    let clock = Arc::new(ManualClock::fixed());
    let analyzer = Arc::new(MockAnalyzer::reporting(2, 100));
    let coordinator = builder(&clock, analyzer.clone()).build().unwrap();

    assert!(coordinator.submit(free("alice", "C1")).await.is_completed());
    assert!(coordinator.submit(free("bob", "C1")).await.is_completed());
    assert_eq!(analyzer.call_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_slot_left_admits_exactly_one() {
    let clock = Arc::new(ManualClock::fixed());
    let analyzer = Arc::new(MockAnalyzer::reporting(3, 100).with_delay(Duration::from_millis(50)));
    let coordinator = Arc::new(builder(&clock, analyzer.clone()).build().unwrap());

    assert!(coordinator.submit(free("alice", "C0")).await.is_completed());

    let submissions = (0..8).map(|i| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.submit(free("alice", &format!("S{i}"))).await })
    });
    let outcomes: Vec<AuditOutcome> = futures::future::join_all(submissions)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    let denied = outcomes
        .iter()
        .filter(|o| o.denial_reason() == Some(&DenialReason::HourlyLimit))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(denied, 7);
    assert_eq!(analyzer.call_count(), 2);
    assert_eq!(
        coordinator.ledger().snapshot(&IdentityId::from("alice")).used_hour,
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_analyze_once() {
    let clock = Arc::new(ManualClock::fixed());
    let analyzer = Arc::new(MockAnalyzer::reporting(5, 100).with_delay(Duration::from_millis(50)));
    let coordinator = Arc::new(
        AuditCoordinatorBuilder::new()
            .with_clock(clock.clone())
            .with_paid_analyzer(analyzer.clone())
            .build()
            .unwrap(),
    );

    let submissions = (0..4).map(|_| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .submit(AuditRequest::new("carol", "C1", Tier::Premium))
                .await
        })
    });
    let outcomes: Vec<AuditOutcome> = futures::future::join_all(submissions)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let labels: Vec<&str> = outcomes.iter().map(AuditOutcome::label).collect();
    assert_eq!(labels.iter().filter(|l| **l == "completed").count(), 1);
    assert_eq!(labels.iter().filter(|l| **l == "cached").count(), 3);
    assert_eq!(analyzer.call_count(), 1);
}

#[tokio::test]
async fn test_analysis_failure_records_nothing() {
    let clock = Arc::new(ManualClock::fixed());
    let failing = Arc::new(MockAnalyzer::failing("upstream 500"));
    let coordinator = AuditCoordinatorBuilder::new()
        .with_clock(clock.clone())
        .with_paid_analyzer(failing.clone())
        .build()
        .unwrap();

    let outcome = coordinator
        .submit(AuditRequest::new("dave", "C1", Tier::Subscriber))
        .await;
    match outcome {
        AuditOutcome::Failed {
            reason: FailureReason::Analysis(detail),
        } => assert!(detail.contains("upstream 500")),
        other => panic!("expected analysis failure, got {other:?}"),
    }

    let snapshot = coordinator.ledger().snapshot(&IdentityId::from("dave"));
    assert_eq!(snapshot.used_hour, 0);
    assert_eq!(snapshot.in_flight, 0);
    assert_eq!(snapshot.spent_this_month, 0);
    assert!(coordinator.cache().is_empty());
    // No automatic retry.
    assert_eq!(failing.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_analysis_timeout_fails_request() {
    let clock = Arc::new(ManualClock::fixed());
    let slow = Arc::new(MockAnalyzer::reporting(3, 100).with_delay(Duration::from_secs(600)));
    let mut config = AppConfig::default();
    config.coordinator.analysis_timeout_ms = 1_000;
    let coordinator = builder(&clock, slow)
        .with_config(config)
        .build()
        .unwrap();

    let outcome = coordinator.submit(free("erin", "C1")).await;
    assert!(matches!(
        outcome,
        AuditOutcome::Failed {
            reason: FailureReason::Timeout(_)
        }
    ));
    assert_eq!(
        coordinator.ledger().snapshot(&IdentityId::from("erin")).used_hour,
        0
    );
}

#[tokio::test]
async fn test_paid_tier_routes_and_charges_spend() {
    let clock = Arc::new(ManualClock::fixed());
    let local = Arc::new(MockAnalyzer::reporting(2, 10));
    let remote = Arc::new(
        MockAnalyzer::reporting(8, 1000)
            .with_name("remote")
            .with_cost(180_000),
    );
    let coordinator = builder(&clock, local.clone())
        .with_paid_analyzer(remote.clone())
        .build()
        .unwrap();

    let outcome = coordinator
        .submit(AuditRequest::new("frank", "C1", Tier::Subscriber))
        .await;
    let AuditOutcome::Completed { result, fee, .. } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(result.report.analyzer, "remote");
    assert_eq!(local.call_count(), 0);
    assert_eq!(remote.call_count(), 1);
    // (0.05 SOL + 1000 * 1000) * 2.0 - 20%
    assert_eq!(fee.total_lamports, 81_600_000);

    let snapshot = coordinator.ledger().snapshot(&IdentityId::from("frank"));
    assert_eq!(snapshot.spent_this_month, 180_000);
    assert_eq!(snapshot.tier, Tier::Subscriber);
}

#[tokio::test]
async fn test_budget_limit_denies_paid_request() {
    let clock = Arc::new(ManualClock::fixed());
    let mut config = AppConfig::default();
    config.quota.subscriber.monthly_budget_lamports = 1_000;
    config.coordinator.paid_cost_estimate_lamports = 5_000;
    let coordinator = builder(&clock, Arc::new(MockAnalyzer::reporting(1, 1)))
        .with_config(config)
        .build()
        .unwrap();

    let outcome = coordinator
        .submit(AuditRequest::new("gina", "C1", Tier::Subscriber))
        .await;
    assert_eq!(outcome.denial_reason(), Some(&DenialReason::BudgetLimit));
}

#[tokio::test]
async fn test_side_effect_failures_do_not_change_outcome() {
    let clock = Arc::new(ManualClock::fixed());
    let publisher = Arc::new(RecordingPublisher::new());
    let notarizer = Arc::new(RecordingNotarizer::failing());
    let coordinator = builder(&clock, Arc::new(MockAnalyzer::reporting(4, 100)))
        .with_store(Arc::new(RecordingArtifactStore::failing()))
        .with_notarizer(notarizer)
        .with_publisher(publisher.clone())
        .build()
        .unwrap();

    let outcome = coordinator.submit(free("hank", "C1")).await;
    let AuditOutcome::Completed {
        result,
        side_effects,
        ..
    } = outcome
    else {
        panic!("expected completion");
    };

    let failed: Vec<SideEffectKind> = side_effects.warnings.iter().map(|w| w.effect).collect();
    assert_eq!(
        failed,
        vec![SideEffectKind::Storage, SideEffectKind::Notarization]
    );
    assert!(side_effects.artifact_url.is_none());
    assert!(side_effects.proof_ref.is_none());
    assert_eq!(publisher.published(), vec![result.audit_id.clone()]);

    // Settlement still happened.
    let cached = coordinator
        .cache()
        .by_identity(&IdentityId::from("hank"), false)
        .unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].audit_id, result.audit_id);
    assert!(cached[0].artifact_url.is_none());
    assert_eq!(
        coordinator.ledger().snapshot(&IdentityId::from("hank")).used_hour,
        1
    );
}

#[tokio::test]
async fn test_system_throttle_spans_identities() {
    let clock = Arc::new(ManualClock::fixed());
    let mut config = AppConfig::default();
    config.quota.global_per_minute = 2;
    let coordinator: AuditCoordinator = builder(&clock, Arc::new(MockAnalyzer::reporting(1, 1)))
        .with_config(config)
        .build()
        .unwrap();

    assert!(coordinator.submit(free("a", "C1")).await.is_completed());
    assert!(coordinator.submit(free("b", "C1")).await.is_completed());
    assert_eq!(
        coordinator.submit(free("c", "C1")).await.denial_reason(),
        Some(&DenialReason::SystemThrottle)
    );

    clock.advance(Duration::from_secs(60));
    assert!(coordinator.submit(free("c", "C1")).await.is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_cache_write_failure_records_no_usage() {
    let clock = Arc::new(ManualClock::fixed());
    let analyzer = Arc::new(MockAnalyzer::reporting(4, 100).with_delay(Duration::from_secs(60)));
    let coordinator = Arc::new(builder(&clock, analyzer).build().unwrap());
    assert!(coordinator.submit(free("bob", "C0")).await.is_completed());

    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.submit(free("alice", "C1")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    // A panic while the cache lock is held poisons it mid-analysis.
    let cache = coordinator.cache().clone();
    let panicked = std::thread::spawn(move || cache.retain(|_| panic!("cache purge failed")))
        .join()
        .is_err();
    assert!(panicked);

    match running.await.unwrap() {
        AuditOutcome::Failed {
            reason: FailureReason::InternalInconsistency(detail),
        } => assert!(detail.contains("cache write")),
        other => panic!("expected internal inconsistency, got {other:?}"),
    }
    let snapshot = coordinator.ledger().snapshot(&IdentityId::from("alice"));
    assert_eq!(snapshot.used_hour, 0);
    assert_eq!(snapshot.in_flight, 0);
    assert!(coordinator
        .cache()
        .by_identity(&IdentityId::from("alice"), true)
        .unwrap()
        .is_empty());

    // Unrelated requests keep working once the poison is observed.
    let later = coordinator.submit(free("carol", "Q9")).await;
    assert!(later.is_completed(), "unexpected outcome: {later:?}");
    assert_eq!(
        coordinator.ledger().snapshot(&IdentityId::from("carol")).used_hour,
        1
    );
}

#[tokio::test]
async fn test_remote_client_timeout_fails_with_timeout() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/analyze", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let clock = Arc::new(ManualClock::fixed());
    let remote = RemoteAnalyzer::new(url, None, 50_000, 180, Duration::from_millis(200)).unwrap();
    let coordinator = builder(&clock, Arc::new(MockAnalyzer::reporting(1, 1)))
        .with_paid_analyzer(Arc::new(remote))
        .build()
        .unwrap();

    let outcome = coordinator
        .submit(AuditRequest::new("frank", "C1", Tier::Subscriber))
        .await;
    match outcome {
        AuditOutcome::Failed {
            reason: FailureReason::Timeout(detail),
        } => assert!(detail.contains("remote analyzer")),
        other => panic!("expected timeout, got {other:?}"),
    }
    let snapshot = coordinator.ledger().snapshot(&IdentityId::from("frank"));
    assert_eq!(snapshot.used_hour, 0);
    assert_eq!(snapshot.in_flight, 0);
    server.abort();
}
