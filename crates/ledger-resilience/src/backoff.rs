use std::time::Duration;

use rand::Rng;

/// `base * 2^attempt`, jittered by `± jitter_fraction` (spec §4.3 uses 50%,
/// §4.9's retry schedule uses 25%). Shared so every backoff computation in
/// the job fabric reads the same way.
pub fn backoff_with_jitter(base: Duration, attempt: u32, jitter_fraction: f64) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi(attempt as i32);
    let jitter = exp * jitter_fraction;
    let delta = rand::thread_rng().gen_range(-jitter..=jitter);
    Duration::from_secs_f64((exp + delta).max(0.0))
}

/// Retries `op` up to `max_attempts` times (the first call counts as
/// attempt 0), sleeping `backoff_with_jitter` between attempts, as long as
/// `is_retriable` returns true for the returned error.
pub async fn retry_with_jitter<T, E, F, Fut>(
    max_attempts: u32,
    base: Duration,
    jitter_fraction: f64,
    is_retriable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < max_attempts && is_retriable(&e) => {
                let wait = backoff_with_jitter(base, attempt, jitter_fraction);
                tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for attempt in 0..5 {
            let d = backoff_with_jitter(base, attempt, 0.5);
            let exp = base.as_secs_f64() * 2f64.powi(attempt as i32);
            assert!(d.as_secs_f64() >= exp * 0.5 - 1e-6);
            assert!(d.as_secs_f64() <= exp * 1.5 + 1e-6);
        }
    }
}
