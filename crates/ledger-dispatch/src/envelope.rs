use chrono::Utc;
use ledger_core::model::{JobEnvelope, Priority};

/// Bumped whenever `JobEnvelope`'s on-wire shape changes; carried in every
/// envelope so a worker can refuse or migrate an envelope from an older
/// schema (spec §4.9: "Job metadata copied into envelope: ... schema version").
pub const ENVELOPE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct NewJob {
    pub document_id: String,
    pub priority: Priority,
    pub requesting_user_id: Option<String>,
    pub content_hashes: Vec<String>,
    pub max_retries: u32,
}

pub fn build_envelope(job_id: impl Into<String>, dlq_destination: impl Into<String>, job: NewJob) -> JobEnvelope {
    JobEnvelope {
        job_id: job_id.into(),
        document_id: job.document_id,
        priority: job.priority,
        requesting_user_id: job.requesting_user_id,
        created_at: Utc::now(),
        schema_version: ENVELOPE_SCHEMA_VERSION,
        worker_version: env!("CARGO_PKG_VERSION").to_string(),
        p95_hint_ms: None,
        content_hashes: job.content_hashes,
        retry_count: 0,
        max_retries: job.max_retries,
        dlq_destination: dlq_destination.into(),
    }
}
