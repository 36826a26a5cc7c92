use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use ledger_core::model::{AuditEventType, Priority};
use ledger_dispatch::{enqueue, NewJob};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::to_response;
use crate::state::AppState;

/// `POST /v1/documents/{document_id}/process?priority=default` (spec §8
/// scenario 1). Looks the document up to confirm it exists and to seed the
/// envelope's content hashes, then hands off to the dispatcher.
pub async fn enqueue_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let priority = match params.get("priority").map(String::as_str) {
        Some("high") => Priority::High,
        Some("low") => Priority::Low,
        Some("default") | None => Priority::Default,
        Some(other) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "INVALID_INPUT", "message": format!("unknown priority {other}") })),
            )
        }
    };

    let document = match state.repo.load(&document_id).await {
        Ok(document) => document,
        Err(e) => return to_response(&e),
    };

    let job_uuid = Uuid::new_v4();
    let new_job = NewJob {
        document_id: document.id.clone(),
        priority,
        requesting_user_id: None,
        content_hashes: document.sha256_canonical.into_iter().collect(),
        max_retries: 3,
    };

    let envelope = match enqueue(&state.kv, &state.settings, job_uuid.to_string(), new_job).await {
        Ok(envelope) => envelope,
        Err(e) => return to_response(&e),
    };

    if let Err(e) = state
        .audit
        .add_event(job_uuid, AuditEventType::ENQUEUED, None, None, None, json!({"document_id": document_id}))
        .await
    {
        tracing::warn!(error = %e, "failed to record enqueue audit event");
    }

    (
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": envelope.job_id, "queue": envelope.priority.queue_name() })),
    )
}

/// `DELETE /v1/documents/{document_id}` — kicks off the GDPR deletion
/// workflow (spec §4.11's "Deletion workflow", invoked by a separate
/// endpoint).
pub async fn delete_document(State(state): State<AppState>, Path(document_id): Path<String>) -> (StatusCode, Json<Value>) {
    let document = match state.repo.load(&document_id).await {
        Ok(document) => document,
        Err(e) => return to_response(&e),
    };

    let artifacts = document
        .deletion_manifest
        .map(|m| m.artifacts)
        .unwrap_or_default();

    match ledger_jobs::gdpr::initiate_deletion(state.repo.as_ref(), state.storage.clone(), state.audit.as_ref(), &document_id, None, artifacts).await {
        Ok(manifest) => (StatusCode::ACCEPTED, Json(json!({ "status": manifest.status }))),
        Err(e) => to_response(&e),
    }
}
