use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ledger_core::model::{ArtifactRef, AuditEventType, DeletionManifest, DocumentStatus, ManifestStatus};
use ledger_core::{Error, Result};
use ledger_storage::ObjectStoreClient;
use uuid::Uuid;

use crate::repository::DocumentRepository;

const MAX_DELETION_ATTEMPTS: u32 = 3;

/// Mirrors the original's `initiate_job_deletion`: cancels the document if
/// still running, builds a deletion manifest from its artifact references,
/// persists it, audits `DELETION_REQUESTED`, then kicks off async deletion
/// (spec §4.11: "Deletion workflow").
pub async fn initiate_deletion(
    repo: &dyn DocumentRepository,
    storage: Arc<ObjectStoreClient>,
    audit: &ledger_audit::AuditBatcher,
    document_id: &str,
    user_id: Option<&str>,
    artifacts: Vec<ArtifactRef>,
) -> Result<DeletionManifest> {
    let document = repo.load(document_id).await?;
    if matches!(document.status, DocumentStatus::Uploaded | DocumentStatus::Processing | DocumentStatus::Retrying) {
        repo.set_cancellation_requested(document_id, true).await?;
    }

    let manifest = DeletionManifest {
        artifacts,
        status: ManifestStatus::Pending,
        last_attempt: None,
    };
    repo.set_deletion_manifest(document_id, Some(&manifest)).await?;

    let job_id = Uuid::parse_str(document_id).unwrap_or_else(|_| Uuid::new_v4());
    audit
        .add_event(job_id, AuditEventType::DELETION_REQUESTED, None, user_id, None, serde_json::json!({"manifest_created": true}))
        .await?;

    execute_deletion(repo, storage, audit, document_id, MAX_DELETION_ATTEMPTS).await?;
    Ok(manifest)
}

/// Drives one document's manifest to completion or exhaustion, retrying
/// failed artifact deletes with `2^attempt` second backoff up to
/// `max_attempts` (spec §4.11).
pub async fn execute_deletion(
    repo: &dyn DocumentRepository,
    storage: Arc<ObjectStoreClient>,
    audit: &ledger_audit::AuditBatcher,
    document_id: &str,
    max_attempts: u32,
) -> Result<()> {
    for attempt in 0..max_attempts {
        let document = repo.load(document_id).await?;
        let Some(mut manifest) = document.deletion_manifest else { return Ok(()) };

        let mut failed = Vec::new();
        for artifact in &manifest.artifacts {
            if let Err(e) = storage.delete(&artifact.key).await {
                tracing::error!(key = %artifact.key, error = %e, "artifact delete failed");
                failed.push(artifact.clone());
            }
        }

        if failed.is_empty() {
            repo.set_deletion_manifest(document_id, None).await?;
            repo.delete_document(document_id).await?;
            let job_id = Uuid::parse_str(document_id).unwrap_or_else(|_| Uuid::new_v4());
            audit
                .add_event(
                    job_id,
                    AuditEventType::DELETION_COMPLETED,
                    None,
                    None,
                    None,
                    serde_json::json!({"artifacts_deleted": manifest.artifacts.len()}),
                )
                .await?;
            return Ok(());
        }

        manifest.artifacts = failed;
        manifest.status = ManifestStatus::Failed;
        manifest.last_attempt = Some(Utc::now());
        repo.set_deletion_manifest(document_id, Some(&manifest)).await?;

        if attempt + 1 < max_attempts {
            tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
        }
    }
    Err(Error::Transient(format!(
        "deletion for document {document_id} did not complete within {max_attempts} attempts"
    )))
}

/// Periodic sweeper: re-drives every document with a non-null manifest
/// (spec §4.11: "A periodic sweeper re-drives any document with a non-null
/// manifest"). Failures are logged, not propagated, so one stuck document
/// doesn't block the rest of the sweep.
pub async fn sweep_stale_deletions(repo: &dyn DocumentRepository, storage: Arc<ObjectStoreClient>, audit: &ledger_audit::AuditBatcher) -> Result<usize> {
    let document_ids = repo.documents_with_pending_manifest().await?;
    let mut swept = 0;
    for document_id in &document_ids {
        if let Err(e) = execute_deletion(repo, storage.clone(), audit, document_id, MAX_DELETION_ATTEMPTS).await {
            tracing::error!(document_id, error = %e, "sweep: deletion attempt failed");
        } else {
            swept += 1;
        }
    }
    Ok(swept)
}
