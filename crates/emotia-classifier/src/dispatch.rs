//! Request/response protocol for driving the gateway from another process.
//!
//! One JSON object per line in each direction, tagged by `action`.

use anyhow::{Context, Result};
use emotia_core::emoji_for_label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::gateway::ClassificationGateway;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum WorkerRequest {
    #[serde(rename_all = "camelCase")]
    DetectEmotion {
        text: String,
        #[serde(default)]
        message_id: Option<String>,
    },
    GetRateLimitStatus,
    ClearCache,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum WorkerResponse {
    #[serde(rename_all = "camelCase")]
    EmotionDetected {
        message_id: Option<String>,
        emotion: String,
        emoji: String,
        scores: BTreeMap<String, f64>,
    },
    #[serde(rename_all = "camelCase")]
    EmotionError {
        message_id: Option<String>,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    RateLimitStatus {
        remaining: usize,
        total: usize,
        reset_in_ms: u64,
    },
    CacheCleared {
        removed: usize,
    },
    /// The line was not a valid request
    Rejected {
        error: String,
    },
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub async fn handle_request(gateway: &ClassificationGateway, request: WorkerRequest) -> WorkerResponse {
    match request {
        WorkerRequest::DetectEmotion { text, message_id } => match gateway.classify(&text).await {
            Ok(result) => WorkerResponse::EmotionDetected {
                message_id,
                emoji: emoji_for_label(&result.label).to_string(),
                emotion: result.label,
                scores: result.scores,
            },
            Err(e) => {
                log::warn!("Classification failed: {e}");
                WorkerResponse::EmotionError {
                    message_id,
                    retry_after_ms: e.retry_after().map(millis),
                    error: e.to_string(),
                }
            }
        },
        WorkerRequest::GetRateLimitStatus => {
            let status = gateway.rate_limit_status();
            WorkerResponse::RateLimitStatus {
                remaining: status.remaining,
                total: status.total,
                reset_in_ms: millis(status.reset_in),
            }
        }
        WorkerRequest::ClearCache => match gateway.cache().clear() {
            Ok(removed) => WorkerResponse::CacheCleared { removed },
            Err(e) => WorkerResponse::Rejected {
                error: format!("Failed to clear cache: {e:#}"),
            },
        },
    }
}

/// Decode one line and handle it; undecodable lines are rejected, not fatal
pub async fn handle_line(gateway: &ClassificationGateway, line: &str) -> WorkerResponse {
    match serde_json::from_str::<WorkerRequest>(line) {
        Ok(request) => handle_request(gateway, request).await,
        Err(e) => {
            log::warn!("Rejected worker request: {e}");
            WorkerResponse::Rejected {
                error: format!("invalid request: {e}"),
            }
        }
    }
}

/// Serve JSON-line requests from `reader` until EOF.
///
/// Requests are handled concurrently, so responses may be written in a
/// different order than requests arrived; `messageId` correlates them.
/// Lines that are not UTF-8 are rejected and reading continues.
///
/// # Errors
///
/// Returns an error if reading input or writing a response fails
pub async fn serve<R, W>(gateway: Arc<ClassificationGateway>, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<WorkerResponse>();

    let read = async move {
        let mut buf = Vec::new();
        loop {
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let Ok(line) = String::from_utf8(std::mem::take(&mut buf)) else {
                log::warn!("Rejected worker request: not UTF-8");
                if tx
                    .send(WorkerResponse::Rejected {
                        error: "invalid request: not UTF-8".to_string(),
                    })
                    .is_err()
                {
                    log::debug!("Worker output closed, dropping response");
                }
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            let gateway = Arc::clone(&gateway);
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = handle_line(&gateway, &line).await;
                if tx.send(response).is_err() {
                    log::debug!("Worker output closed, dropping response");
                }
            });
        }
        Ok::<_, std::io::Error>(())
    };

    let write = async move {
        while let Some(response) = rx.recv().await {
            let mut encoded = serde_json::to_string(&response)?;
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    };

    let (read_result, write_result) = tokio::join!(read, write);
    read_result.context("Failed to read worker input")?;
    write_result.context("Failed to write worker output")?;
    Ok(())
}
