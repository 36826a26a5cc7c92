use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
    Retrying,
    Cancelled,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed | DocumentStatus::Failed | DocumentStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub object_key: String,
    pub original_filename: String,
    pub content_type: String,
    pub byte_size: i64,
    pub sha256_raw: Option<String>,
    pub sha256_canonical: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub cancellation_requested: bool,
    pub deletion_manifest: Option<DeletionManifest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub document_id: String,
    pub page_number: i32,
    pub preview_object_key: String,
    pub pixel_width: i32,
    pub pixel_height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Table,
    Ocr,
    Figure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Pending,
    Reviewed,
    Approved,
    Rejected,
}

/// Open-schema artifact payload, modeled as tagged variants instead of a
/// universal dict so downstream consumers get typed access to the common
/// fields while still tolerating forward-compatible extras.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArtifactPayload {
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
        #[serde(default)]
        extra: serde_json::Map<String, serde_json::Value>,
    },
    Ocr {
        cells: Vec<OcrCell>,
        #[serde(default)]
        extra: serde_json::Map<String, serde_json::Value>,
    },
    Figure {
        caption: Option<String>,
        bounding_box: Option<[f64; 4]>,
        #[serde(default)]
        extra: serde_json::Map<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrCell {
    pub page: i32,
    pub row: i32,
    pub column: i32,
    pub text: String,
    pub is_numeric: bool,
    pub numeric_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub document_id: String,
    pub kind: ArtifactKind,
    pub page_number: i32,
    pub producing_engine: String,
    pub payload: ArtifactPayload,
    pub status: ArtifactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingEvent {
    pub id: i64,
    pub document_id: String,
    pub kind: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Default,
    Low,
}

impl Priority {
    pub fn queue_name(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Default => "default",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: String,
    pub document_id: String,
    pub priority: Priority,
    pub requesting_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub schema_version: u32,
    pub worker_version: String,
    pub p95_hint_ms: Option<u64>,
    pub content_hashes: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub dlq_destination: String,
}

impl JobEnvelope {
    pub fn exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Starting,
    Processing,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub progress: f64,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration: Option<f64>,
    pub priority: Option<Priority>,
    pub document_id: Option<String>,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(job_id: impl Into<String>, state: JobState, progress: f64) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            progress,
            message: None,
            timestamp: Utc::now(),
            duration: None,
            priority: None,
            document_id: None,
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub job_id: Uuid,
    pub event_type: String,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub trace_id: Option<Uuid>,
    pub idempotency_key: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct AuditEventType;
impl AuditEventType {
    pub const ENQUEUED: &'static str = "ENQUEUED";
    pub const STARTED: &'static str = "STARTED";
    pub const EXTRACTED: &'static str = "EXTRACTED";
    pub const EXPORTED: &'static str = "EXPORTED";
    pub const ERROR: &'static str = "ERROR";
    pub const DELETION_REQUESTED: &'static str = "DELETION_REQUESTED";
    pub const DELETION_COMPLETED: &'static str = "DELETION_COMPLETED";
    pub const CANCELLED: &'static str = "CANCELLED";
    pub const PARTIAL_CANCEL: &'static str = "PARTIAL_CANCEL";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CostStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub user_id: Option<String>,
    pub provider: String,
    pub pages: i32,
    pub cost_cents: i64,
    pub status: CostStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ManifestStatus {
    Pending,
    Deleting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: String,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionManifest {
    pub artifacts: Vec<ArtifactRef>,
    pub status: ManifestStatus,
    pub last_attempt: Option<DateTime<Utc>>,
}
