use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use ledger_core::{Error, Result};
use tokio::sync::Mutex;

/// Tracks named timers so a long-running step can never leak a timeout past
/// its own call boundary, and so the active set is inspectable (spec §5:
/// "a shared `TimeoutManager`... entries are canceled in a `finally` and
/// never leak across call boundaries... MUST NOT depend on Unix-only
/// signals"). Built on `tokio::time::timeout`, which cancels the wrapped
/// future cooperatively without signals, satisfying that constraint
/// directly rather than reimplementing it.
pub struct TimeoutManager {
    active: Mutex<HashMap<String, Instant>>,
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `fut` under a `duration` timeout, keyed by `name` (e.g.
    /// `"{job_id}:render_previews"`). The key is always removed on exit,
    /// success or failure, mirroring the original's `finally`.
    pub async fn run<T, F>(&self, name: impl Into<String>, duration: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let name = name.into();
        self.active.lock().await.insert(name.clone(), Instant::now());
        let result = tokio::time::timeout(duration, fut).await;
        self.active.lock().await.remove(&name);

        match result {
            Ok(inner) => inner,
            Err(_) => Err(Error::Transient(format!(
                "step '{name}' timed out after {}ms",
                duration.as_millis()
            ))),
        }
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_fast_futures() {
        let mgr = TimeoutManager::new();
        let result = mgr
            .run("fast", Duration::from_millis(100), async { Ok::<_, Error>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(mgr.active_count().await, 0);
    }

    #[tokio::test]
    async fn expires_slow_futures_and_clears_entry() {
        let mgr = TimeoutManager::new();
        let result = mgr
            .run("slow", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Error>(())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(mgr.active_count().await, 0);
    }
}
