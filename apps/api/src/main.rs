//! HTTP surface for Ledger Lift: enqueue documents, stream job progress over
//! SSE, request GDPR deletion, and expose Prometheus metrics.
//!
//! This binary has no counterpart in the worker's original shape — the
//! dispatcher, KV store, and Postgres pool are shared infrastructure, so the
//! API process wires the same pieces the worker does, minus the job driver.

mod errors;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use ledger_core::config::Settings;
use ledger_jobs::repository::pg::PgDocumentRepository;
use ledger_kv::KvClient;
use ledger_storage::{validation::ObjectValidation, ObjectStoreClient};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::trace::TraceLayer;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env();

    let kv = KvClient::connect(&settings.redis_url, settings.redis_max_retries).await?;
    let pool = ledger_db::build_pool(&settings.database_url, &ledger_db::PoolConfig::default()).await?;

    let repo: Arc<dyn ledger_jobs::DocumentRepository> = Arc::new(PgDocumentRepository::new(pool.clone(), 3));
    let storage = Arc::new(
        ObjectStoreClient::new(
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "ledger-lift".to_string()),
            ObjectValidation::default(),
            ledger_resilience::CircuitBreakerConfig::default(),
            Duration::from_secs(3600),
            3,
        )
        .await,
    );

    let audit = Arc::new(ledger_audit::AuditBatcher::new(
        pool.clone(),
        kv.clone(),
        ledger_audit::AuditBatcherConfig {
            batch_size: settings.audit_batch_size,
            flush_interval: Duration::from_millis(settings.audit_flush_interval_ms),
            max_queue_size: settings.audit_max_queue_size,
            durable_mode: settings.audit_durable_mode,
        },
    ));
    audit.start().await;

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");

    let state = AppState {
        kv,
        settings,
        repo,
        storage,
        audit,
        prometheus_handle,
    };

    let app = Router::new()
        .route("/v1/documents/:document_id/process", post(routes::documents::enqueue_document))
        .route("/v1/documents/:document_id", delete(routes::documents::delete_document))
        .route("/v1/jobs/:job_id/events", get(routes::events::job_events))
        .route("/metrics", get(routes::metrics::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("ledger-lift api listening on 0.0.0.0:8080");
    axum::serve(listener, app).await?;

    Ok(())
}
