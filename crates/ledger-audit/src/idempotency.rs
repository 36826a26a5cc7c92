use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 of the canonicalized (sorted-key, compact) payload with the
/// timestamp truncated to the second (spec §3): two adds within the same
/// second with identical fields collapse to one key.
pub fn idempotency_key(
    job_id: Uuid,
    event_type: &str,
    trace_id: Option<Uuid>,
    user_id: Option<&str>,
    ip_address: Option<&str>,
    metadata: &serde_json::Value,
    created_at: DateTime<Utc>,
) -> String {
    let truncated = created_at.with_nanosecond(0).unwrap_or(created_at);
    let payload = serde_json::json!({
        "job_id": job_id.to_string(),
        "event_type": event_type,
        "trace_id": trace_id.map(|t| t.to_string()).unwrap_or_default(),
        "user_id": user_id.unwrap_or_default(),
        "ip": ip_address.unwrap_or_default(),
        "metadata": metadata,
        "ts": truncated.to_rfc3339(),
    });
    let canonical = canonicalize(&payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

use chrono::Timelike;

/// Serializes with object keys sorted, matching Python's
/// `json.dumps(..., sort_keys=True, separators=(",", ":"))`.
fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap(), canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payloads_within_the_same_second_collapse() {
        let job_id = Uuid::nil();
        let ts = "2026-01-01T00:00:00.100Z".parse::<DateTime<Utc>>().unwrap();
        let ts_later = "2026-01-01T00:00:00.900Z".parse::<DateTime<Utc>>().unwrap();
        let a = idempotency_key(job_id, "ENQUEUED", None, Some("u1"), Some("1.1.1.1"), &serde_json::json!({}), ts);
        let b = idempotency_key(job_id, "ENQUEUED", None, Some("u1"), Some("1.1.1.1"), &serde_json::json!({}), ts_later);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_event_type_changes_key() {
        let job_id = Uuid::nil();
        let ts = Utc::now();
        let a = idempotency_key(job_id, "ENQUEUED", None, None, None, &serde_json::json!({}), ts);
        let b = idempotency_key(job_id, "STARTED", None, None, None, &serde_json::json!({}), ts);
        assert_ne!(a, b);
    }
}
