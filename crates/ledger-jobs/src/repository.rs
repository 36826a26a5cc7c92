use async_trait::async_trait;
use ledger_core::model::{ArtifactKind, ArtifactPayload, ArtifactStatus, Document, DocumentStatus};
use ledger_core::Result;
use serde_json::Value;

/// Storage seam for the per-document pipeline, so `driver.rs` is testable
/// without a live Postgres instance. `PgDocumentRepository` is the production
/// implementation (spec §4.4's pooled gateway, used the way the original's
/// raw `text(...)` queries against `jobs`/`documents` are used).
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn load(&self, document_id: &str) -> Result<Document>;

    /// Flips `status` and records `error_message` in the same statement
    /// (spec §4.11: "flip document to FAILED with error message").
    async fn set_status(&self, document_id: &str, status: DocumentStatus, error_message: Option<&str>) -> Result<()>;

    async fn set_cancellation_requested(&self, document_id: &str, requested: bool) -> Result<()>;

    async fn log_event(&self, document_id: &str, kind: &str, message: &str, metadata: Value) -> Result<()>;

    async fn insert_page(&self, document_id: &str, page_number: i32, preview_object_key: &str, width: i32, height: i32) -> Result<()>;

    /// Persists a detected table or OCR result as an `Artifact` row (spec
    /// §4.11: extracted tables and OCR cells both become artifacts, keyed
    /// by kind and the engine that produced them).
    async fn insert_artifact(
        &self,
        document_id: &str,
        kind: ArtifactKind,
        page_number: i32,
        producing_engine: &str,
        payload: &ArtifactPayload,
        status: ArtifactStatus,
    ) -> Result<()>;

    async fn set_deletion_manifest(&self, document_id: &str, manifest: Option<&ledger_core::model::DeletionManifest>) -> Result<()>;

    async fn documents_with_pending_manifest(&self) -> Result<Vec<String>>;

    async fn delete_document(&self, document_id: &str) -> Result<()>;
}

pub mod pg {
    use super::*;
    use ledger_core::Error;
    use ledger_db::execute_with_retry;
    use sqlx::PgPool;

    pub struct PgDocumentRepository {
        pool: PgPool,
        retry_attempts: u32,
    }

    impl PgDocumentRepository {
        pub fn new(pool: PgPool, retry_attempts: u32) -> Self {
            Self { pool, retry_attempts }
        }
    }

    #[async_trait]
    impl DocumentRepository for PgDocumentRepository {
        async fn load(&self, document_id: &str) -> Result<Document> {
            execute_with_retry(self.retry_attempts, || async {
                sqlx::query_as::<_, DocumentRow>(
                    "SELECT id, object_key, original_filename, content_type, byte_size,
                            sha256_raw, sha256_canonical, status, error_message,
                            cancellation_requested, deletion_manifest, created_at, updated_at
                     FROM documents WHERE id = $1",
                )
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
            })
            .await
            .map(Document::from)
        }

        async fn set_status(&self, document_id: &str, status: DocumentStatus, error_message: Option<&str>) -> Result<()> {
            let status_str = status_str(status);
            execute_with_retry(self.retry_attempts, || async {
                sqlx::query(
                    "UPDATE documents SET status = $1, error_message = $2, updated_at = now() WHERE id = $3",
                )
                .bind(status_str)
                .bind(error_message)
                .bind(document_id)
                .execute(&self.pool)
                .await
            })
            .await?;
            Ok(())
        }

        async fn set_cancellation_requested(&self, document_id: &str, requested: bool) -> Result<()> {
            execute_with_retry(self.retry_attempts, || async {
                sqlx::query("UPDATE documents SET cancellation_requested = $1 WHERE id = $2")
                    .bind(requested)
                    .bind(document_id)
                    .execute(&self.pool)
                    .await
            })
            .await?;
            Ok(())
        }

        async fn log_event(&self, document_id: &str, kind: &str, message: &str, metadata: Value) -> Result<()> {
            execute_with_retry(self.retry_attempts, || async {
                sqlx::query(
                    "INSERT INTO processing_events (document_id, kind, message, metadata, created_at)
                     VALUES ($1, $2, $3, $4, now())",
                )
                .bind(document_id)
                .bind(kind)
                .bind(message)
                .bind(&metadata)
                .execute(&self.pool)
                .await
            })
            .await?;
            Ok(())
        }

        async fn insert_page(&self, document_id: &str, page_number: i32, preview_object_key: &str, width: i32, height: i32) -> Result<()> {
            execute_with_retry(self.retry_attempts, || async {
                sqlx::query(
                    "INSERT INTO pages (document_id, page_number, preview_object_key, pixel_width, pixel_height)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(document_id)
                .bind(page_number)
                .bind(preview_object_key)
                .bind(width)
                .bind(height)
                .execute(&self.pool)
                .await
            })
            .await?;
            Ok(())
        }

        async fn insert_artifact(
            &self,
            document_id: &str,
            kind: ArtifactKind,
            page_number: i32,
            producing_engine: &str,
            payload: &ArtifactPayload,
            status: ArtifactStatus,
        ) -> Result<()> {
            let payload_json = serde_json::to_value(payload)
                .map_err(|e| Error::Fatal(format!("serialize artifact payload failed: {e}")))?;
            execute_with_retry(self.retry_attempts, || async {
                sqlx::query(
                    "INSERT INTO artifacts (id, document_id, kind, page_number, producing_engine, payload, status, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())",
                )
                .bind(uuid::Uuid::new_v4().to_string())
                .bind(document_id)
                .bind(artifact_kind_str(kind))
                .bind(page_number)
                .bind(producing_engine)
                .bind(&payload_json)
                .bind(artifact_status_str(status))
                .execute(&self.pool)
                .await
            })
            .await?;
            Ok(())
        }

        async fn set_deletion_manifest(&self, document_id: &str, manifest: Option<&ledger_core::model::DeletionManifest>) -> Result<()> {
            let json = manifest
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| Error::Fatal(format!("serialize deletion manifest failed: {e}")))?;
            execute_with_retry(self.retry_attempts, || async {
                sqlx::query("UPDATE documents SET deletion_manifest = $1 WHERE id = $2")
                    .bind(&json)
                    .bind(document_id)
                    .execute(&self.pool)
                    .await
            })
            .await?;
            Ok(())
        }

        async fn documents_with_pending_manifest(&self) -> Result<Vec<String>> {
            execute_with_retry(self.retry_attempts, || async {
                sqlx::query_as::<_, (String,)>("SELECT id FROM documents WHERE deletion_manifest IS NOT NULL")
                    .fetch_all(&self.pool)
                    .await
            })
            .await
            .map(|rows| rows.into_iter().map(|(id,)| id).collect())
        }

        async fn delete_document(&self, document_id: &str) -> Result<()> {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| Error::Transient(format!("begin delete tx failed: {e}")))?;
            sqlx::query("DELETE FROM cost_records WHERE job_id = $1::uuid")
                .bind(document_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::Transient(format!("delete cost records failed: {e}")))?;
            sqlx::query("DELETE FROM documents WHERE id = $1")
                .bind(document_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::Transient(format!("delete document failed: {e}")))?;
            tx.commit()
                .await
                .map_err(|e| Error::Transient(format!("commit delete tx failed: {e}")))
        }
    }

    fn artifact_kind_str(kind: ArtifactKind) -> &'static str {
        match kind {
            ArtifactKind::Table => "table",
            ArtifactKind::Ocr => "ocr",
            ArtifactKind::Figure => "figure",
        }
    }

    fn artifact_status_str(status: ArtifactStatus) -> &'static str {
        match status {
            ArtifactStatus::Pending => "pending",
            ArtifactStatus::Reviewed => "reviewed",
            ArtifactStatus::Approved => "approved",
            ArtifactStatus::Rejected => "rejected",
        }
    }

    fn status_str(status: DocumentStatus) -> &'static str {
        match status {
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
            DocumentStatus::Retrying => "RETRYING",
            DocumentStatus::Cancelled => "CANCELLED",
        }
    }

    #[derive(sqlx::FromRow)]
    struct DocumentRow {
        id: String,
        object_key: String,
        original_filename: String,
        content_type: String,
        byte_size: i64,
        sha256_raw: Option<String>,
        sha256_canonical: Option<String>,
        status: String,
        error_message: Option<String>,
        cancellation_requested: bool,
        deletion_manifest: Option<serde_json::Value>,
        created_at: chrono::DateTime<chrono::Utc>,
        updated_at: chrono::DateTime<chrono::Utc>,
    }

    impl From<DocumentRow> for Document {
        fn from(row: DocumentRow) -> Self {
            Document {
                id: row.id,
                object_key: row.object_key,
                original_filename: row.original_filename,
                content_type: row.content_type,
                byte_size: row.byte_size,
                sha256_raw: row.sha256_raw,
                sha256_canonical: row.sha256_canonical,
                status: parse_status(&row.status),
                error_message: row.error_message,
                cancellation_requested: row.cancellation_requested,
                deletion_manifest: row.deletion_manifest.and_then(|v| serde_json::from_value(v).ok()),
                created_at: row.created_at,
                updated_at: row.updated_at,
            }
        }
    }

    fn parse_status(raw: &str) -> DocumentStatus {
        match raw {
            "UPLOADED" => DocumentStatus::Uploaded,
            "PROCESSING" => DocumentStatus::Processing,
            "COMPLETED" => DocumentStatus::Completed,
            "RETRYING" => DocumentStatus::Retrying,
            "CANCELLED" => DocumentStatus::Cancelled,
            _ => DocumentStatus::Failed,
        }
    }
}
