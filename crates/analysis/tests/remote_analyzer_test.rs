//! RemoteAnalyzer against a one-shot local HTTP responder.

use std::time::Duration;

use audit_gate_analysis::RemoteAnalyzer;
use audit_gate_core::{Analyzer, Error, SubjectId};
use secrecy::Secret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve exactly one request with `status` and `body`, returning the raw
/// request text through the join handle.
async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/analyze", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + content_length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&raw).into_owned()
    });

    (url, handle)
}

#[tokio::test]
async fn test_remote_analysis_round_trip() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"summary":"two issues","risk_score":8,"workload_units":1000,"findings":[]}"#,
    )
    .await;

    let analyzer = RemoteAnalyzer::new(
        url,
        Some(Secret::new("sk-test".to_string())),
        50_000,
        180,
        Duration::from_secs(5),
    )
    .unwrap();
    let report = analyzer
        .analyze(&SubjectId::from("C1"), "contract Vault {}")
        .await
        .unwrap();

    assert_eq!(report.analyzer, "remote");
    assert_eq!(report.risk_bucket, 8);
    assert_eq!(report.workload_units, 1000);
    assert_eq!(report.cost_lamports, 180_000);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /analyze"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
    assert!(request.contains(r#""subject":"C1""#));
}

#[tokio::test]
async fn test_upstream_error_is_analysis_error() {
    let (url, server) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;

    let analyzer = RemoteAnalyzer::new(url, None, 50_000, 180, Duration::from_secs(5)).unwrap();
    let err = analyzer
        .analyze(&SubjectId::from("C1"), "contract Vault {}")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Analysis(_)), "unexpected error: {err}");
    server.await.unwrap();
}

/// Accept connections and never answer.
async fn serve_silently() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/analyze", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (url, handle)
}

#[tokio::test]
async fn test_client_timeout_is_timeout_error() {
    let (url, server) = serve_silently().await;

    let analyzer = RemoteAnalyzer::new(url, None, 50_000, 180, Duration::from_millis(200)).unwrap();
    let err = analyzer
        .analyze(&SubjectId::from("C1"), "contract Vault {}")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)), "unexpected error: {err}");
    server.abort();
}
