use ledger_core::config::Settings;
use ledger_core::model::{JobEnvelope, JobState, ProgressSnapshot};
use ledger_core::{Error, Result};
use ledger_kv::emergency_stop;
use ledger_kv::KvClient;

use crate::envelope::{build_envelope, NewJob};
use crate::metrics;
use crate::progress::write_snapshot;
use crate::queues::Queues;

/// Builds an envelope, checks the emergency-stop gate, pushes it onto its
/// priority queue, and writes the initial `queued` snapshot (spec §4.9).
///
/// Returns `Error::QueueHalted` without writing anything when the
/// emergency-stop key is set.
pub async fn enqueue(kv: &KvClient, settings: &Settings, job_id: impl Into<String>, job: NewJob) -> Result<JobEnvelope> {
    if emergency_stop::is_halted(kv, &settings.emergency_stop_key).await? {
        return Err(Error::QueueHalted);
    }

    let queues = Queues::from_settings(settings);
    let job_id = job_id.into();
    let envelope = build_envelope(job_id.clone(), queues.dead.clone(), job);
    let queue_name = queues.for_priority(envelope.priority).to_string();

    let payload = serde_json::to_string(&envelope)
        .map_err(|e| Error::Fatal(format!("failed to serialize job envelope: {e}")))?;
    kv.rpush(&queue_name, &payload).await?;

    metrics::record_enqueued(priority_label(envelope.priority));

    let snapshot = ProgressSnapshot::new(&envelope.job_id, JobState::Queued, 0.0)
        .with_document(&envelope.document_id)
        .with_message("queued");
    let snapshot = crate::progress::with_priority(snapshot, envelope.priority);
    write_snapshot(kv, &snapshot, default_snapshot_ttl()).await?;

    Ok(envelope)
}

/// Moves an exhausted or fatally-failed envelope to the dead queue, copying
/// its metadata and a failure reason (spec §4.9).
pub async fn dead_letter(kv: &KvClient, settings: &Settings, mut envelope: JobEnvelope, failed_reason: &str) -> Result<()> {
    let queues = Queues::from_settings(settings);
    envelope.retry_count = envelope.retry_count.max(envelope.max_retries);
    let mut payload = serde_json::to_value(&envelope)
        .map_err(|e| Error::Fatal(format!("failed to serialize job envelope: {e}")))?;
    payload["failed_reason"] = serde_json::Value::String(failed_reason.to_string());
    kv.rpush(&queues.dead, &payload.to_string()).await?;
    metrics::record_dead_lettered();

    let snapshot = ProgressSnapshot::new(&envelope.job_id, JobState::Failed, 1.0)
        .with_document(&envelope.document_id)
        .with_error(failed_reason);
    let snapshot = crate::progress::with_priority(snapshot, envelope.priority);
    write_snapshot(kv, &snapshot, default_snapshot_ttl()).await
}

/// Waits out `interval_i = base * 2^i (+/- 25%)` for the current retry
/// count, then re-enqueues with an incremented retry count and writes a
/// `retrying` snapshot (spec §4.9 failure handling).
pub async fn requeue_for_retry(
    kv: &KvClient,
    settings: &Settings,
    mut envelope: JobEnvelope,
    retry_base: std::time::Duration,
) -> Result<()> {
    let delay = crate::retry::retry_delay(retry_base, envelope.retry_count);
    tokio::time::sleep(delay).await;

    let queues = Queues::from_settings(settings);
    envelope.retry_count += 1;
    let queue_name = queues.for_priority(envelope.priority).to_string();
    let payload = serde_json::to_string(&envelope)
        .map_err(|e| Error::Fatal(format!("failed to serialize job envelope: {e}")))?;
    kv.rpush(&queue_name, &payload).await?;
    metrics::record_retry(priority_label(envelope.priority));

    let snapshot = ProgressSnapshot::new(&envelope.job_id, JobState::Retrying, 0.0)
        .with_document(&envelope.document_id)
        .with_message(format!("retry {} of {}", envelope.retry_count, envelope.max_retries));
    let snapshot = crate::progress::with_priority(snapshot, envelope.priority);
    write_snapshot(kv, &snapshot, default_snapshot_ttl()).await
}

fn priority_label(priority: ledger_core::model::Priority) -> &'static str {
    priority.queue_name()
}

fn default_snapshot_ttl() -> std::time::Duration {
    std::time::Duration::from_secs(3600)
}
