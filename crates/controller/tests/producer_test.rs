//! Line-oriented producer over in-memory input.

use std::sync::Arc;
use std::time::Duration;

use audit_gate_controller::{serve_lines, AuditCoordinatorBuilder, JobQueue, JobState, ProducerStats};
use audit_gate_core::mocks::{ManualClock, MockAnalyzer};
use serde_json::Value;

fn pipeline(analyzer: MockAnalyzer) -> (Arc<audit_gate_controller::AuditCoordinator>, Arc<JobQueue>) {
    let clock = Arc::new(ManualClock::fixed());
    let coordinator = AuditCoordinatorBuilder::new()
        .with_clock(clock.clone())
        .with_free_analyzer(Arc::new(analyzer))
        .build()
        .unwrap();
    (Arc::new(coordinator), Arc::new(JobQueue::new(clock)))
}

fn output_lines(out: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(out)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_inline_outcome_written_after_input_closes() {
    let (coordinator, queue) = pipeline(MockAnalyzer::reporting(3, 10).with_delay(Duration::from_secs(2)));
    let input = br#"{"identity":"alice","subject":"C1","tier":"free","payload":"contract A {}"}
"#;

    let mut out = Vec::new();
    let stats = serve_lines(&input[..], &mut out, coordinator, queue, std::future::pending())
        .await
        .unwrap();

    assert_eq!(
        stats,
        ProducerStats {
            submitted: 1,
            queued: 0,
            malformed: 0
        }
    );
    let lines = output_lines(&out);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["status"], "completed");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_still_waits_for_inline_requests() {
    let (coordinator, queue) = pipeline(MockAnalyzer::reporting(3, 10).with_delay(Duration::from_secs(2)));
    let (mut client, server) = tokio::io::duplex(1024);
    tokio::io::AsyncWriteExt::write_all(
        &mut client,
        b"{\"identity\":\"alice\",\"subject\":\"C1\",\"tier\":\"free\"}\n",
    )
    .await
    .unwrap();

    // Input stays open; the interrupt arrives while the audit is running.
    let mut out = Vec::new();
    let stats = serve_lines(
        tokio::io::BufReader::new(server),
        &mut out,
        coordinator,
        queue,
        tokio::time::sleep(Duration::from_millis(500)),
    )
    .await
    .unwrap();

    assert_eq!(stats.submitted, 1);
    let lines = output_lines(&out);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["status"], "completed");
    drop(client);
}

#[tokio::test]
async fn test_queued_and_malformed_lines() {
    let (coordinator, queue) = pipeline(MockAnalyzer::reporting(3, 10));
    let input = br#"{"identity":"bot","subject":"C1","tier":"free","queue":true}
not json

{"subject":"C2"}
"#;

    let mut out = Vec::new();
    let stats = serve_lines(&input[..], &mut out, coordinator, queue.clone(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(stats.queued, 1);
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.submitted, 0);

    let lines = output_lines(&out);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["status"], "queued");
    let job_id = lines[0]["job_id"].as_str().unwrap();
    assert_eq!(queue.status(job_id).unwrap().state, JobState::Queued);
}
