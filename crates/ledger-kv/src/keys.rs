//! Key layout for the KV store (spec §6, names exact where the spec pins them).

pub fn job_progress(job_id: &str) -> String {
    format!("job:{job_id}:progress")
}

pub const PROGRESS_CHANNEL: &str = "jobs:progress";
pub const DURATIONS_KEY: &str = "jobs:durations";
pub const DURATIONS_MAX_LEN: isize = 200;

pub fn cas_phash_doc(document_id: &str) -> String {
    format!("cas:phash:doc:{document_id}")
}

pub fn cas_phash_page(page_index: usize, phash_hex: &str) -> String {
    format!("cas:phash:page:{page_index}:{phash_hex}")
}

pub const AUDIT_STREAM: &str = "audit:events";
