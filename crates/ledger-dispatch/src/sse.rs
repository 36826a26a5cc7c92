use std::time::{Duration, Instant};

use futures::StreamExt;
use ledger_core::model::ProgressSnapshot;
use ledger_core::{Error, Result};
use ledger_kv::keys::PROGRESS_CHANNEL;
use ledger_kv::KvClient;
use tokio::sync::mpsc;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub enum SseEvent {
    Data(String),
    Keepalive,
}

/// Subscribes to `jobs:progress`, replays the currently-stored snapshot for
/// `job_id` as a catch-up event, then forwards matching events plus periodic
/// keepalives until the receiver is dropped (spec §4.10).
///
/// Transport-agnostic: the caller (an HTTP handler) adapts `SseEvent` into
/// whatever wire framing it uses.
pub async fn stream_events(kv: KvClient, job_id: String, keepalive_interval: Duration) -> Result<mpsc::Receiver<SseEvent>> {
    let mut pubsub = kv.pubsub().await?;
    pubsub
        .subscribe(PROGRESS_CHANNEL)
        .await
        .map_err(|e| Error::Transient(format!("subscribe to {PROGRESS_CHANNEL} failed: {e}")))?;

    let catch_up = crate::progress::current_snapshot(&kv, &job_id).await?;
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        if let Some(snapshot) = catch_up.as_ref().and_then(|s| serde_json::to_string(s).ok()) {
            if tx.send(SseEvent::Data(snapshot)).await.is_err() {
                return;
            }
        }

        let mut last_activity = Instant::now();
        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                msg = messages.next() => {
                    let Some(msg) = msg else { break };
                    let Ok(payload) = msg.get_payload::<String>() else { continue };
                    let matches_job = matches_job_id(&payload, &job_id);
                    if matches_job {
                        last_activity = Instant::now();
                        if tx.send(SseEvent::Data(payload)).await.is_err() {
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(DRAIN_POLL_INTERVAL) => {
                    if last_activity.elapsed() > keepalive_interval {
                        last_activity = Instant::now();
                        if tx.send(SseEvent::Keepalive).await.is_err() {
                            break;
                        }
                    }
                }
            }
            if tx.is_closed() {
                break;
            }
        }
    });

    Ok(rx)
}

fn matches_job_id(payload: &str, job_id: &str) -> bool {
    serde_json::from_str::<ProgressSnapshot>(payload)
        .map(|s| s.job_id == job_id)
        .unwrap_or(false)
}
