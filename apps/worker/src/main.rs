//! Priority-queue worker entrypoint.
//!
//! DELIVERY MODEL: at-least-once, same as the teacher's stream worker — a
//! job pulled off a queue stays invisible to other workers only for the
//! duration of the in-process `BLPOP`; a crash mid-run drops it (the caller
//! is expected to re-enqueue on timeout via the dispatcher's retry path, not
//! this process). Handlers in `ledger_jobs::driver` are written to tolerate
//! replay: `acquire()` rejects documents that are not `Uploaded`/`Retrying`.
//!
//! CONCURRENCY: `WORKER_CONCURRENCY` independent pull loops share one
//! `KvClient` (backed by a multiplexed `ConnectionManager`) and one Postgres
//! pool, mirroring the original's "N concurrent units per process" model
//! (spec §4.9).
//!
//! BACKGROUND TASKS: alongside the pull loops, one task periodically reports
//! queue depth gauges and sweeps stale GDPR deletions (spec §4.11's periodic
//! sweeper), so neither depends on a job happening to flow through.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ledger_core::config::Settings;
use ledger_core::model::{JobState, ProgressSnapshot};
use ledger_dispatch::{dead_letter, requeue_for_retry, write_snapshot, PriorityPuller, Queues};
use ledger_jobs::repository::pg::PgDocumentRepository;
use ledger_jobs::{gdpr, JobContext, TimeoutManager};
use ledger_kv::{emergency_stop, KvClient};
use ledger_storage::{validation::ObjectValidation, ObjectStoreClient};

const PULL_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BASE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env();
    tracing::info!(concurrency = settings.worker_concurrency, "starting ledger-lift worker");

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
    let costs = Arc::new(ledger_costs::CostLedger::new(pool.clone()));

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

    let timeouts = Arc::new(TimeoutManager::new());
    let financial_detector = ledger_financial::FinancialTableDetector::default();

    let ctx = Arc::new(JobContext {
        repo: repo.clone(),
        storage: storage.clone(),
        costs,
        audit: audit.clone(),
        settings: settings.clone(),
        timeouts,
        financial_detector,
    });

    let queues = Queues::from_settings(&settings);

    let mut handles = Vec::new();
    for worker_index in 0..settings.worker_concurrency.max(1) {
        let kv = kv.clone();
        let settings = settings.clone();
        let queues = queues.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            pull_loop(worker_index, kv, settings, queues, ctx).await;
        }));
    }

    handles.push(tokio::spawn(background_tasks(kv.clone(), settings.clone(), queues.clone(), repo.clone(), storage.clone(), audit.clone())));

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "worker task panicked");
        }
    }

    audit.stop().await;
    Ok(())
}

async fn pull_loop(worker_index: usize, kv: KvClient, settings: Settings, queues: Queues, ctx: Arc<JobContext>) {
    let mut puller = PriorityPuller::new(queues, 5);
    loop {
        match emergency_stop::is_halted(&kv, &settings.emergency_stop_key).await {
            Ok(true) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(worker_index, error = %e, "emergency-stop check failed, proceeding cautiously");
            }
        }

        let envelope = match puller.pull(&kv, PULL_TIMEOUT).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(worker_index, error = %e, "pull failed, backing off");
                tokio::time::sleep(Duration::from_millis(250)).await;
                continue;
            }
        };

        tracing::info!(worker_index, job_id = %envelope.job_id, document_id = %envelope.document_id, "processing job");

        let started = ProgressSnapshot::new(&envelope.job_id, JobState::Processing, 0.0)
            .with_document(&envelope.document_id)
            .with_message("processing started");
        let started = ledger_dispatch::progress::with_priority(started, envelope.priority);
        if let Err(e) = write_snapshot(&kv, &started, Duration::from_secs(3600)).await {
            tracing::warn!(job_id = %envelope.job_id, error = %e, "failed to write processing snapshot");
        }

        let scratch_dir = PathBuf::from(std::env::var("SCRATCH_DIR").unwrap_or_else(|_| "/tmp/ledger-lift".into()))
            .join(&envelope.job_id);
        let job_id = match uuid::Uuid::parse_str(&envelope.job_id) {
            Ok(id) => id,
            Err(_) => uuid::Uuid::new_v4(),
        };

        let started_at = std::time::Instant::now();
        let run_result = ledger_jobs::run(&ctx, job_id, &envelope.document_id, &scratch_dir).await;
        let elapsed = started_at.elapsed().as_secs_f64();
        let _ = tokio::fs::remove_dir_all(&scratch_dir).await;

        match run_result {
            Ok(()) => {
                let snapshot = ProgressSnapshot::new(&envelope.job_id, JobState::Completed, 1.0)
                    .with_document(&envelope.document_id)
                    .with_duration(elapsed);
                let snapshot = ledger_dispatch::progress::with_priority(snapshot, envelope.priority);
                if let Err(e) = write_snapshot(&kv, &snapshot, Duration::from_secs(3600)).await {
                    tracing::warn!(job_id = %envelope.job_id, error = %e, "failed to write completed snapshot");
                }
            }
            Err(ledger_core::Error::JobCancelled) => {
                tracing::info!(job_id = %envelope.job_id, "job cancelled, dropping from queue");
                let snapshot = ProgressSnapshot::new(&envelope.job_id, JobState::Cancelled, 1.0)
                    .with_document(&envelope.document_id);
                let snapshot = ledger_dispatch::progress::with_priority(snapshot, envelope.priority);
                if let Err(e) = write_snapshot(&kv, &snapshot, Duration::from_secs(3600)).await {
                    tracing::warn!(job_id = %envelope.job_id, error = %e, "failed to write cancelled snapshot");
                }
            }
            Err(e) if e.is_retriable() && !envelope.exhausted() => {
                tracing::warn!(job_id = %envelope.job_id, error = %e, "job failed retriably, requeueing");
                if let Err(requeue_err) = requeue_for_retry(&kv, &settings, envelope, RETRY_BASE).await {
                    tracing::error!(error = %requeue_err, "failed to requeue job for retry");
                }
            }
            Err(e) => {
                tracing::error!(job_id = %envelope.job_id, error = %e, "job failed, dead-lettering");
                if let Err(dlq_err) = dead_letter(&kv, &settings, envelope, &e.to_string()).await {
                    tracing::error!(error = %dlq_err, "failed to dead-letter job");
                }
            }
        }
    }
}

/// Periodic housekeeping that does not depend on a job flowing through: queue
/// depth gauges, worker busy count, and the GDPR deletion sweeper.
async fn background_tasks(
    kv: KvClient,
    settings: Settings,
    queues: Queues,
    repo: Arc<dyn ledger_jobs::DocumentRepository>,
    storage: Arc<ObjectStoreClient>,
    audit: Arc<ledger_audit::AuditBatcher>,
) {
    let puller = PriorityPuller::new(queues, 5);
    const REPORT_INTERVAL_SECS: u64 = 5;
    let sweep_every_n_ticks = (settings.deletion_sweep_interval_seconds.max(1) / REPORT_INTERVAL_SECS).max(1);
    let mut ticks: u64 = 0;
    loop {
        if let Err(e) = puller.report_depths(&kv).await {
            tracing::warn!(error = %e, "failed to report queue depths");
        }

        if ticks % sweep_every_n_ticks == 0 {
            match gdpr::sweep_stale_deletions(repo.as_ref(), storage.clone(), audit.as_ref()).await {
                Ok(swept) if swept > 0 => tracing::info!(swept, "deletion sweep completed"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "deletion sweep failed"),
            }
        }

        ticks += 1;
        tokio::time::sleep(Duration::from_secs(REPORT_INTERVAL_SECS)).await;
    }
}
