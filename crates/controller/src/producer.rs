//! Line-oriented request producer.
//!
//! Reads newline-delimited JSON audit requests. Lines with `"queue": true`
//! go to the job queue and are acknowledged with their job ID; every other
//! line is submitted inline and its outcome written back as one JSON line.
//! Inline requests still running at end of input or on shutdown are awaited
//! before returning, so no outcome is lost.

use serde::Deserialize;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinError, JoinSet};

use audit_gate_core::AuditRequest;

use crate::coordinator::AuditCoordinator;
use crate::jobs::JobQueue;

#[derive(Debug, Deserialize)]
struct InputLine {
    #[serde(flatten)]
    request: AuditRequest,
    #[serde(default)]
    queue: bool,
}

/// Counters for one producer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub submitted: u64,
    pub queued: u64,
    pub malformed: u64,
}

/// Serve requests from `reader` until end of input or `shutdown` resolves.
pub async fn serve_lines<R, W>(
    reader: R,
    mut writer: W,
    coordinator: Arc<AuditCoordinator>,
    queue: Arc<JobQueue>,
    shutdown: impl Future<Output = ()>,
) -> io::Result<ProducerStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut inline: JoinSet<Option<String>> = JoinSet::new();
    let mut stats = ProducerStats::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Producer interrupted");
                break;
            }
            Some(joined) = inline.join_next(), if !inline.is_empty() => {
                write_outcome(&mut writer, joined).await?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let input: InputLine = match serde_json::from_str(&line) {
                    Ok(input) => input,
                    Err(e) => {
                        stats.malformed += 1;
                        tracing::warn!(error = %e, "Ignoring malformed request line");
                        continue;
                    }
                };

                if input.queue {
                    stats.queued += 1;
                    let job_id = queue.enqueue(input.request);
                    let ack = serde_json::json!({ "job_id": job_id, "status": "queued" });
                    write_line(&mut writer, &ack.to_string()).await?;
                } else {
                    stats.submitted += 1;
                    let coordinator = coordinator.clone();
                    inline.spawn(async move {
                        let outcome = coordinator.submit(input.request).await;
                        match serde_json::to_string(&outcome) {
                            Ok(json) => Some(json),
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to encode outcome");
                                None
                            }
                        }
                    });
                }
            }
        }
    }

    if !inline.is_empty() {
        tracing::info!(in_flight = inline.len(), "Waiting for inline requests");
    }
    while let Some(joined) = inline.join_next().await {
        write_outcome(&mut writer, joined).await?;
    }
    writer.flush().await?;
    Ok(stats)
}

async fn write_outcome<W: AsyncWrite + Unpin>(
    writer: &mut W,
    joined: Result<Option<String>, JoinError>,
) -> io::Result<()> {
    match joined {
        Ok(Some(json)) => write_line(writer, &json).await,
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "Inline request task ended abnormally");
            Ok(())
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
