use std::time::Duration;

use ledger_core::model::{Priority, ProgressSnapshot};
use ledger_core::{Error, Result};
use ledger_kv::durations;
use ledger_kv::keys::{job_progress, PROGRESS_CHANNEL};
use ledger_kv::KvClient;

pub fn with_priority(mut snapshot: ProgressSnapshot, priority: Priority) -> ProgressSnapshot {
    snapshot.priority = Some(priority);
    snapshot
}

/// Persists `snapshot` at `job:{id}:progress` with `ttl` and publishes it on
/// `jobs:progress`; subscribers filter by `job_id` themselves (spec §4.10).
/// Terminal snapshots that carry a duration also feed the p95 ring buffer.
pub async fn write_snapshot(kv: &KvClient, snapshot: &ProgressSnapshot, ttl: Duration) -> Result<()> {
    let payload = serde_json::to_string(snapshot)
        .map_err(|e| Error::Fatal(format!("failed to serialize progress snapshot: {e}")))?;

    kv.set_ex(&job_progress(&snapshot.job_id), &payload, ttl).await?;
    kv.publish(PROGRESS_CHANNEL, &payload).await?;

    if snapshot.state.is_terminal() {
        if let Some(duration) = snapshot.duration {
            durations::record(kv, duration).await?;
            crate::metrics::record_job_duration(duration);
        }
    }

    Ok(())
}

/// Reads back the currently-stored snapshot for catch-up delivery
/// (spec §4.10 step 2), if one still exists (it may have expired).
pub async fn current_snapshot(kv: &KvClient, job_id: &str) -> Result<Option<ProgressSnapshot>> {
    let Some(raw) = kv.get(&job_progress(job_id)).await? else {
        return Ok(None);
    };
    let snapshot = serde_json::from_str(&raw)
        .map_err(|e| Error::Fatal(format!("stored progress snapshot is corrupt: {e}")))?;
    Ok(Some(snapshot))
}
