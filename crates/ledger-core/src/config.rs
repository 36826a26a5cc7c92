use std::env;
use std::time::Duration;

/// Env-var names are kept verbatim (spec §6) where compatibility with the
/// original deployment matters.
#[derive(Debug, Clone)]
pub struct Settings {
    pub features_t1_queue: bool,
    pub features_t1_sse: bool,
    pub redis_url: String,
    pub rq_high_queue: String,
    pub rq_default_queue: String,
    pub rq_low_queue: String,
    pub rq_dlq: String,
    pub worker_concurrency: usize,
    pub redis_max_retries: u32,
    pub parse_timeout_ms: u64,
    pub sse_edge_budget_ms: u64,
    pub metrics_auth: Option<(String, String)>,
    pub emergency_stop_key: String,
    pub ocr_provider: Option<String>,
    pub ocr_provider_mode: String,
    pub ocr_tps_azure: f64,
    pub ocr_tps_textract: f64,
    pub ocr_circuit_open_secs: u64,
    pub ocr_max_retries: u32,
    pub ocr_max_pages: Option<i32>,
    pub azure_di_endpoint: Option<String>,
    pub azure_di_key: Option<String>,
    pub aws_textract_region: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub tesseract_lang: String,
    pub cost_per_page_cents: i64,
    pub max_job_cost_cents: i64,
    pub audit_batch_size: usize,
    pub audit_flush_interval_ms: u64,
    pub audit_max_queue_size: usize,
    pub audit_durable_mode: bool,
    pub deletion_sweep_interval_seconds: u64,
    pub cas_normalize_pdf: bool,
    pub database_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Settings {
    /// Load settings from the process environment, with `.env` loaded first
    /// if present (teacher's own dependency set does not do this; the
    /// convention is carried from `OpenAgentsInc-openagents/backend` and
    /// `adamtc007-ob-poc/web-server`, both of which call `dotenvy::dotenv()`
    /// before reading `env::var`).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let metrics_auth = match (env::var("METRICS_AUTH_USER"), env::var("METRICS_AUTH_PASS")) {
            (Ok(u), Ok(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        };

        Self {
            features_t1_queue: env_bool("FEATURES_T1_QUEUE", true),
            features_t1_sse: env_bool("FEATURES_T1_SSE", true),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379/0"),
            rq_high_queue: env_or("RQ_HIGH_QUEUE", "high"),
            rq_default_queue: env_or("RQ_DEFAULT_QUEUE", "default"),
            rq_low_queue: env_or("RQ_LOW_QUEUE", "low"),
            rq_dlq: env_or("RQ_DLQ", "dead"),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", 2usize),
            redis_max_retries: env_parse("REDIS_MAX_RETRIES", 3u32),
            parse_timeout_ms: env_parse("PARSE_TIMEOUT_MS", 120_000u64),
            sse_edge_budget_ms: env_parse("SSE_EDGE_BUDGET_MS", 35_000u64),
            metrics_auth,
            emergency_stop_key: env_or("EMERGENCY_STOP_KEY", "EMERGENCY_STOP"),
            ocr_provider: env::var("OCR_PROVIDER").ok(),
            ocr_provider_mode: env_or("OCR_PROVIDER_MODE", "auto"),
            ocr_tps_azure: env_parse("OCR_TPS_AZURE", 5.0),
            ocr_tps_textract: env_parse("OCR_TPS_TEXTRACT", 5.0),
            ocr_circuit_open_secs: env_parse("OCR_CIRCUIT_OPEN_SECS", 30u64),
            ocr_max_retries: env_parse("OCR_MAX_RETRIES", 3u32),
            ocr_max_pages: env::var("OCR_MAX_PAGES").ok().and_then(|v| v.parse().ok()),
            azure_di_endpoint: env::var("AZURE_DI_ENDPOINT").ok(),
            azure_di_key: env::var("AZURE_DI_KEY").ok(),
            aws_textract_region: env::var("AWS_TEXTRACT_REGION").ok(),
            aws_access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            aws_secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
            tesseract_lang: env_or("TESSERACT_LANG", "eng"),
            cost_per_page_cents: env_parse("COST_PER_PAGE_CENTS", 2i64),
            max_job_cost_cents: env_parse("MAX_JOB_COST_CENTS", 0i64),
            audit_batch_size: env_parse("AUDIT_BATCH_SIZE", 50usize),
            audit_flush_interval_ms: env_parse("AUDIT_FLUSH_INTERVAL_MS", 1000u64),
            audit_max_queue_size: env_parse("AUDIT_MAX_QUEUE_SIZE", 10_000usize),
            audit_durable_mode: env_bool("AUDIT_DURABLE_MODE", false),
            deletion_sweep_interval_seconds: env_parse("DELETION_SWEEP_INTERVAL_SECONDS", 300u64),
            cas_normalize_pdf: env_bool("CAS_NORMALIZE_PDF", true),
            database_url: env_or("DATABASE_URL", "postgres://localhost/ledger_lift"),
        }
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }
}
