use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub pool_size: u32,
    pub idle_connections: usize,
    pub error: Option<String>,
}

struct Cached {
    at: Instant,
    status: HealthStatus,
}

/// `health()` with a cached TTL (spec §4.4) so a flood of probes doesn't
/// hammer the database.
pub struct HealthProbe {
    ttl: Duration,
    cache: Mutex<Option<Cached>>,
}

impl HealthProbe {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub async fn check(&self, pool: &PgPool) -> HealthStatus {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.at.elapsed() < self.ttl {
                return cached.status.clone();
            }
        }

        let status = match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
            Ok(_) => HealthStatus {
                healthy: true,
                pool_size: pool.size(),
                idle_connections: pool.num_idle(),
                error: None,
            },
            Err(e) => HealthStatus {
                healthy: false,
                pool_size: pool.size(),
                idle_connections: pool.num_idle(),
                error: Some(e.to_string()),
            },
        };

        *cache = Some(Cached {
            at: Instant::now(),
            status: status.clone(),
        });
        status
    }
}
