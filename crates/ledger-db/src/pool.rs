use std::time::Duration;

use ledger_core::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Baseline pool size; `max_connections` below acts as the overflow ceiling.
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub statement_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 20,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(3600),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

pub async fn build_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let statement_timeout_ms = config.statement_timeout.as_millis();
    let connect_options: PgConnectOptions = database_url
        .parse()
        .map_err(|e| ledger_core::Error::Fatal(format!("invalid database url: {e}")))?;
    let connect_options = connect_options.application_name("ledger-lift");

    let pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(
                    format!("SET statement_timeout = {statement_timeout_ms}").as_str(),
                )
                .await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await
        .map_err(|e| ledger_core::Error::Transient(format!("pool connect failed: {e}")))?;

    Ok(pool)
}
