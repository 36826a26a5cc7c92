use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ledger_core::config::Settings;
use ledger_core::model::{
    ArtifactKind, ArtifactPayload, ArtifactStatus, AuditEventType, Document, DocumentStatus, OcrCell,
};
use ledger_core::{Error, Result};
use ledger_financial::FinancialTableDetector;
use ledger_storage::ObjectStoreClient;
use uuid::Uuid;

use crate::cancellation::checkpoint;
use crate::render::render_previews;
use crate::repository::DocumentRepository;
use crate::state_machine::{transition, Effect, JobEvent};
use crate::timeout::TimeoutManager;

const PDF_MAGIC: &[u8] = b"%PDF";
const MAX_DOCUMENT_BYTES: i64 = 200 * 1024 * 1024;

/// Everything the per-run pipeline needs, collected so `run` stays a
/// readable sequence of steps instead of a wall of parameters.
pub struct JobContext {
    pub repo: Arc<dyn DocumentRepository>,
    pub storage: Arc<ObjectStoreClient>,
    pub costs: Arc<ledger_costs::CostLedger>,
    pub audit: Arc<ledger_audit::AuditBatcher>,
    pub settings: Settings,
    pub timeouts: Arc<TimeoutManager>,
    pub financial_detector: FinancialTableDetector,
}

/// Runs the per-run pipeline for one document (spec §4.11, steps 1-8),
/// translating the outcome into a `DocumentStatus` transition and the audit
/// trail that goes with it. Each step is bracketed by a cancellation
/// checkpoint and a cooperative timeout.
pub async fn run(ctx: &JobContext, job_id: Uuid, document_id: &str, scratch_dir: &Path) -> Result<()> {
    let started = std::time::Instant::now();
    let job_id_str = job_id.to_string();
    let result = run_steps(ctx, &job_id_str, document_id, scratch_dir).await;

    match &result {
        Ok(()) => {
            let (status, effects) = transition(DocumentStatus::Processing, JobEvent::Success);
            apply_effects(ctx, document_id, job_id, &effects).await;
            ctx.repo.set_status(document_id, status, None).await?;
        }
        Err(Error::JobCancelled) => {
            let (status, effects) = transition(DocumentStatus::Processing, JobEvent::CancelRequested);
            apply_effects(ctx, document_id, job_id, &effects).await;
            ctx.repo.set_status(document_id, status, None).await?;
        }
        Err(e) if e.is_retriable() => {
            let (status, effects) = transition(DocumentStatus::Processing, JobEvent::Retriable);
            apply_effects(ctx, document_id, job_id, &effects).await;
            ctx.repo.set_status(document_id, status, Some(&e.to_string())).await?;
            return Err(Error::Transient(e.to_string()));
        }
        Err(e) => {
            let (status, effects) = transition(DocumentStatus::Processing, JobEvent::Fatal);
            apply_effects(ctx, document_id, job_id, &effects).await;
            ctx.repo.set_status(document_id, status, Some(&e.to_string())).await?;
        }
    }

    tracing::info!(document_id, elapsed_ms = started.elapsed().as_millis() as u64, ok = result.is_ok(), "run finished");
    result
}

async fn run_steps(ctx: &JobContext, job_id_str: &str, document_id: &str, scratch_dir: &Path) -> Result<()> {
    // 1. Acquire
    checkpoint(ctx.repo.as_ref(), document_id).await?;
    let document = acquire(ctx, document_id).await?;

    // 2. Download
    checkpoint(ctx.repo.as_ref(), document_id).await?;
    let bytes = ctx
        .timeouts
        .run(format!("{job_id_str}:download"), Duration::from_millis(ctx.settings.parse_timeout_ms), download(ctx, &document))
        .await?;

    // 3. Budget gate (page count is approximated from previews below; the
    // cost ledger is re-consulted once the real page count is known).
    checkpoint(ctx.repo.as_ref(), document_id).await?;

    let pdf_path = scratch_dir.join(format!("{document_id}.pdf"));
    tokio::fs::write(&pdf_path, &bytes)
        .await
        .map_err(|e| Error::Transient(format!("failed to stage pdf: {e}")))?;

    // 4. Preflight OCR budget + render previews (step 5) share a page count.
    checkpoint(ctx.repo.as_ref(), document_id).await?;
    let previews = ctx
        .timeouts
        .run(
            format!("{job_id_str}:render_previews"),
            Duration::from_millis(ctx.settings.parse_timeout_ms),
            render_previews(&pdf_path, scratch_dir, 150, ctx.settings.ocr_max_pages),
        )
        .await?;
    let page_count = previews.len() as i32;

    let cost_record_id = ctx
        .costs
        .record(job_id_str_to_uuid(job_id_str), None, "preflight", page_count, ctx.settings.cost_per_page_cents, ctx.settings.max_job_cost_cents)
        .await?;

    for (index, preview_path) in previews.iter().enumerate() {
        checkpoint(ctx.repo.as_ref(), document_id).await?;
        let page_number = (index + 1) as i32;
        let image_bytes = tokio::fs::read(preview_path)
            .await
            .map_err(|e| Error::Transient(format!("failed to read rendered preview: {e}")))?;
        let (width, height) = image::load_from_memory(&image_bytes)
            .map(|img| (img.width() as i32, img.height() as i32))
            .unwrap_or((0, 0));
        let preview_key = format!("previews/{document_id}/page-{page_number}.png");
        ctx.storage
            .put(&preview_key, image_bytes, "image/png", &HashMap::new())
            .await?;
        ctx.repo.insert_page(document_id, page_number, &preview_key, width, height).await?;
    }

    // 6. Extract tables
    checkpoint(ctx.repo.as_ref(), document_id).await?;
    let tables = crate::extract::extract_tables(&pdf_path, &ctx.financial_detector).await.unwrap_or_default();
    for table in &tables {
        ctx.repo
            .log_event(
                document_id,
                "table_detected",
                &format!("page {} scored {:.2}", table.page_number, table.score),
                serde_json::json!({
                    "page_number": table.page_number,
                    "score": table.score,
                    "is_financial": table.is_financial,
                    "requires_review": table.validation.requires_review(),
                }),
            )
            .await?;
        let payload = table_artifact_payload(table.candidate.headers.clone(), table.candidate.rows.clone());
        let status = default_artifact_status(table.validation.requires_review());
        ctx.repo
            .insert_artifact(document_id, TABLE_ARTIFACT_KIND, table.page_number, "pdftotext", &payload, status)
            .await?;
    }

    // 7. OCR (best-effort: absence of a usable provider is not fatal to the
    // run, since table extraction already produced artifacts).
    checkpoint(ctx.repo.as_ref(), document_id).await?;
    let ocr_cells = run_ocr(ctx, &pdf_path, page_count).await;
    if let Some(cells) = &ocr_cells {
        if !cells.is_empty() {
            let payload = ArtifactPayload::Ocr {
                cells: cells.clone(),
                extra: serde_json::Map::new(),
            };
            ctx.repo
                .insert_artifact(document_id, ArtifactKind::Ocr, 0, "ocr_runtime", &payload, ArtifactStatus::Pending)
                .await?;
        }
    }

    // 8. Finalize
    ctx.costs.complete(cost_record_id, true).await?;
    ctx.audit
        .add_event(job_id_str_to_uuid(job_id_str), AuditEventType::EXTRACTED, None, None, None, serde_json::json!({
            "pages": page_count,
            "tables": tables.len(),
            "ocr_cells": ocr_cells.as_ref().map(Vec::len).unwrap_or(0),
        }))
        .await?;

    checkpoint(ctx.repo.as_ref(), document_id).await?;
    Ok(())
}

async fn acquire(ctx: &JobContext, document_id: &str) -> Result<Document> {
    let document = ctx.repo.load(document_id).await?;
    if document.status != DocumentStatus::Uploaded && document.status != DocumentStatus::Retrying {
        return Err(Error::InvalidInput(format!(
            "document {document_id} is not startable from status {:?}",
            document.status
        )));
    }
    ctx.repo.set_status(document_id, DocumentStatus::Processing, None).await?;
    ctx.repo.log_event(document_id, "processing_started", "acquired for processing", serde_json::json!({})).await?;
    Ok(document)
}

async fn download(ctx: &JobContext, document: &Document) -> Result<Vec<u8>> {
    let bytes = ctx.storage.get(&document.object_key).await?;
    if bytes.is_empty() {
        return Err(Error::Fatal("downloaded document is empty".into()));
    }
    if bytes.len() as i64 > MAX_DOCUMENT_BYTES {
        return Err(Error::Fatal(format!("document exceeds max size of {MAX_DOCUMENT_BYTES} bytes")));
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(Error::Fatal("document is missing the %PDF magic header".into()));
    }
    Ok(bytes)
}

async fn run_ocr(ctx: &JobContext, pdf_path: &Path, page_count: i32) -> Option<Vec<OcrCell>> {
    let metadata = serde_json::json!({ "page_count": page_count });
    let runtime = ledger_ocr::build_runtime(&ctx.settings, &metadata).await.ok()?;
    runtime
        .extract_cells(pdf_path, ctx.settings.ocr_max_pages, Some(ctx.settings.parse_timeout_ms))
        .await
        .ok()
}

async fn apply_effects(ctx: &JobContext, document_id: &str, job_id: Uuid, effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::WriteProcessingEvent(message) => {
                let _ = ctx.repo.log_event(document_id, message, message, serde_json::json!({})).await;
            }
            Effect::EmitAudit(event_type) => {
                let _ = ctx.audit.add_event(job_id, event_type, None, None, None, serde_json::json!({})).await;
            }
        }
    }
}

fn job_id_str_to_uuid(job_id_str: &str) -> Uuid {
    Uuid::parse_str(job_id_str).unwrap_or_else(|_| Uuid::new_v4())
}

fn table_artifact_payload(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> ArtifactPayload {
    ArtifactPayload::Table {
        headers,
        rows,
        extra: serde_json::Map::new(),
    }
}

fn default_artifact_status(requires_review: bool) -> ArtifactStatus {
    if requires_review {
        ArtifactStatus::Pending
    } else {
        ArtifactStatus::Approved
    }
}

const TABLE_ARTIFACT_KIND: ArtifactKind = ArtifactKind::Table;
