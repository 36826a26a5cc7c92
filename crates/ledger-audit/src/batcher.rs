use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ledger_core::model::AuditEvent;
use ledger_core::Result;
use ledger_kv::keys::AUDIT_STREAM;
use ledger_kv::KvClient;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::idempotency::idempotency_key;

#[derive(Debug, Clone)]
pub struct AuditBatcherConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_queue_size: usize,
    pub durable_mode: bool,
}

struct Shared {
    queue: Mutex<VecDeque<AuditEvent>>,
    pool: PgPool,
    kv: KvClient,
    config: AuditBatcherConfig,
    dropped: AtomicU64,
}

/// Bounded in-memory batcher (spec §4.6). `add` either enqueues or, in
/// durable mode, appends directly to `audit:events`, bypassing the queue
/// entirely. A background loop flushes on whichever comes first: the flush
/// interval or the queue reaching `batch_size`.
pub struct AuditBatcher {
    shared: Arc<Shared>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AuditBatcher {
    pub fn new(pool: PgPool, kv: KvClient, config: AuditBatcherConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                pool,
                kv,
                config,
                dropped: AtomicU64::new(0),
            }),
            loop_handle: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut handle = self.loop_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let shared = self.shared.clone();
        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(shared.config.flush_interval);
            loop {
                interval.tick().await;
                if let Err(e) = flush(&shared).await {
                    tracing::error!(error = %e, "audit flush loop error");
                }
            }
        }));
    }

    /// Cancels the loop and performs one final flush (spec §4.6).
    pub async fn stop(&self) {
        if let Some(handle) = self.loop_handle.lock().await.take() {
            handle.abort();
        }
        if let Err(e) = flush(&self.shared).await {
            tracing::error!(error = %e, "final audit flush failed");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_event(
        &self,
        job_id: Uuid,
        event_type: &str,
        trace_id: Option<Uuid>,
        user_id: Option<&str>,
        ip_address: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<bool> {
        let created_at = Utc::now();
        let key = idempotency_key(
            job_id,
            event_type,
            trace_id,
            user_id,
            ip_address,
            &metadata,
            created_at,
        );
        let event = AuditEvent {
            id: Uuid::new_v4(),
            job_id,
            event_type: event_type.to_string(),
            user_id: user_id.map(str::to_string),
            ip_address: ip_address.map(str::to_string),
            trace_id,
            idempotency_key: key,
            metadata,
            created_at,
        };

        if self.shared.config.durable_mode {
            let payload = serde_json::to_string(&event)
                .map_err(|e| ledger_core::Error::Fatal(format!("audit serialize failed: {e}")))?;
            self.shared.kv.xadd(AUDIT_STREAM, &[("payload", payload.as_str())]).await?;
            return Ok(true);
        }

        let mut queue = self.shared.queue.lock().await;
        if queue.len() >= self.shared.config.max_queue_size {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::error!("audit queue full; dropping event");
            return Ok(false);
        }
        let should_flush_now = queue.len() + 1 >= self.shared.config.batch_size;
        queue.push_back(event);
        drop(queue);

        if should_flush_now {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                if let Err(e) = flush(&shared).await {
                    tracing::error!(error = %e, "size-triggered audit flush failed");
                }
            });
        }
        Ok(true)
    }
}

async fn flush(shared: &Shared) -> Result<()> {
    if shared.config.durable_mode {
        return Ok(());
    }

    let batch: Vec<AuditEvent> = {
        let mut queue = shared.queue.lock().await;
        let n = queue.len().min(shared.config.batch_size.max(queue.len()));
        queue.drain(..n).collect()
    };
    if batch.is_empty() {
        return Ok(());
    }

    let result = insert_batch(&shared.pool, &batch).await;
    if let Err(e) = result {
        tracing::error!(error = %e, "failed to flush audit batch; requeueing");
        let mut queue = shared.queue.lock().await;
        for event in batch.into_iter().rev() {
            queue.push_front(event);
        }
        return Err(e);
    }
    Ok(())
}

async fn insert_batch(pool: &PgPool, batch: &[AuditEvent]) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| ledger_core::Error::Transient(format!("begin audit tx failed: {e}")))?;
    for event in batch {
        sqlx::query(
            "INSERT INTO audit_events (id, job_id, event_type, user_id, ip_address, trace_id, idempotency_key, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (idempotency_key) DO NOTHING",
        )
        .bind(event.id)
        .bind(event.job_id)
        .bind(&event.event_type)
        .bind(&event.user_id)
        .bind(&event.ip_address)
        .bind(event.trace_id)
        .bind(&event.idempotency_key)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| ledger_core::Error::Transient(format!("audit insert failed: {e}")))?;
    }
    tx.commit()
        .await
        .map_err(|e| ledger_core::Error::Transient(format!("commit audit batch failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_sane() {
        let cfg = AuditBatcherConfig {
            batch_size: 50,
            flush_interval: Duration::from_millis(1000),
            max_queue_size: 10_000,
            durable_mode: false,
        };
        assert!(cfg.batch_size < cfg.max_queue_size);
    }
}
