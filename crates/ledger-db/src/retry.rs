use std::time::Duration;

use ledger_core::{Error, Result};
use ledger_resilience::backoff_with_jitter;

/// Connection-invalidated, deadlock, and statement-timeout conditions are
/// retriable (spec §4.4); everything else (integrity violations, syntax
/// errors) propagates immediately.
fn is_retriable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01") | Some("57014"))
        }
        _ => false,
    }
}

fn classify(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::RowNotFound => Error::NotFound("row not found".into()),
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            Error::AlreadyExists(db_err.message().to_string())
        }
        _ if is_retriable(&err) => Error::Transient(err.to_string()),
        _ => Error::Fatal(err.to_string()),
    }
}

/// Retries `op` up to `max_attempts` times on retriable sqlx errors with
/// exponential backoff + jitter (spec §4.4's `execute_with_retry`).
pub async fn execute_with_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < max_attempts.max(1) && is_retriable(&e) => {
                let wait = backoff_with_jitter(Duration::from_millis(250), attempt, 0.5);
                tracing::warn!(attempt, error = %e, "retryable database error");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(classify(e)),
        }
    }
}
